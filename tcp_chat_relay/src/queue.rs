// FIFO buffer of relay messages waiting for the next broadcast.
//
// Filled during a tick by publisher intake and join/leave events, emptied in
// one piece by the session's flush. Messages are transient: whatever is
// drained is the whole batch for that flush, and nothing is kept for
// subscribers that register later.

use std::collections::VecDeque;

use tcp_chat_protocol::RelayMessage;

#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<RelayMessage>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, message: RelayMessage) {
        self.messages.push_back(message);
    }

    /// Take everything queued so far, oldest first, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<RelayMessage> {
        self.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(name: &str, text: &str) -> RelayMessage {
        RelayMessage::Chat {
            name: name.into(),
            text: text.into(),
        }
    }

    #[test]
    fn drain_is_fifo_and_clears() {
        let mut queue = MessageQueue::new();
        queue.enqueue(chat("a", "1"));
        queue.enqueue(RelayMessage::Joined { name: "b".into() });
        queue.enqueue(chat("a", "2"));
        assert_eq!(queue.len(), 3);

        let batch = queue.drain();
        assert_eq!(
            batch,
            vec![
                chat("a", "1"),
                RelayMessage::Joined { name: "b".into() },
                chat("a", "2"),
            ]
        );
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn later_messages_form_a_new_batch() {
        let mut queue = MessageQueue::new();
        queue.enqueue(chat("a", "old"));
        let _ = queue.drain();
        queue.enqueue(chat("a", "new"));
        assert_eq!(queue.drain(), vec![chat("a", "new")]);
    }
}
