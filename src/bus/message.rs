//! Transport message envelope

/// A single message on the bus
///
/// `data` is opaque to the transport; handlers decode it. `reply` carries the
/// ephemeral inbox of a pending `Bus::request`, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(subject: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            data,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Reply address, ignoring blank values
    pub fn reply_to(&self) -> Option<&str> {
        self.reply
            .as_deref()
            .map(str::trim)
            .filter(|reply| !reply.is_empty())
    }
}
