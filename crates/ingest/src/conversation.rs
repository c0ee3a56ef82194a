//! Conversation state transitions.
//!
//! Pure functions over the conversation row; the pipeline persists the
//! result. Both directions of activity share one reopen rule: `resolved`
//! and `snoozed` go back to `open`, while `open` and `pending` are left
//! alone.

use courier_common::{ConversationStatus, Direction};
use courier_store::{Conversation, Message};

/// Apply a new contact message: bump the unread counter, refresh the
/// denormalized preview, reopen if dormant.
pub fn apply_inbound(conversation: &mut Conversation, message: &Message) {
    conversation.unread_count += 1;
    update_preview(conversation, message);
    reopen_on_activity(conversation);
}

/// Apply a new operator message: the operator has evidently seen the
/// thread, so the unread counter resets.
pub fn apply_outbound(conversation: &mut Conversation, message: &Message) {
    conversation.unread_count = 0;
    update_preview(conversation, message);
    reopen_on_activity(conversation);
}

fn update_preview(conversation: &mut Conversation, message: &Message) {
    conversation.last_message_content = Some(message.content.clone());
    conversation.last_message_at = Some(message.created_at);
    conversation.last_message_direction = Some(message.direction);
}

fn reopen_on_activity(conversation: &mut Conversation) {
    if matches!(
        conversation.status,
        ConversationStatus::Resolved | ConversationStatus::Snoozed
    ) {
        conversation.status = ConversationStatus::Open;
    }
}
