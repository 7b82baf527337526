use medassist_core_types::{Message, Role};

/// Fold one content delta into the transcript.
///
/// Appends to the last message when it is an assistant message, otherwise
/// pushes a new assistant message. Returns whether the transcript changed;
/// an empty delta never does.
pub fn fold_delta(transcript: &mut Vec<Message>, delta: &str) -> bool {
    if delta.is_empty() {
        return false;
    }
    match transcript.last_mut() {
        Some(last) if last.role == Role::Assistant => last.content.push_str(delta),
        _ => transcript.push(Message::assistant(delta)),
    }
    true
}
