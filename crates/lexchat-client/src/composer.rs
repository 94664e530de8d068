use crate::channel::{MessageChannel, SendOutcome};
use crate::error::Result;

/// Draft text of a conversation's input box.
///
/// The draft is cleared only after a successful send, so a failed send
/// leaves it in place for the user to retry.
pub struct MessageComposer {
    channel: MessageChannel,
    draft: String,
}

impl MessageComposer {
    /// A composer sending as the channel's member.
    pub fn new(channel: MessageChannel) -> Self {
        Self {
            channel,
            draft: String::new(),
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Whether the send button should be enabled.
    pub fn can_send(&self) -> bool {
        !self.draft.trim().is_empty() && !self.channel.is_sending()
    }

    pub async fn submit(&mut self) -> Result<SendOutcome> {
        let outcome = self.channel.send_message(&self.draft).await?;
        self.draft.clear();
        Ok(outcome)
    }
}
