use crate::Fragment;
use std::{collections::VecDeque, sync::mpsc, thread, time::Duration};

/// A mock [crate::Source] that replays a fixed list of fragments.
pub struct Replay {
    fragments: VecDeque<Fragment>,
    delay: Option<Duration>,
}

impl Replay {
    /// Create a new [Replay] that yields `fragments` in order and then reports exhaustion.
    pub fn new(fragments: impl IntoIterator<Item = Fragment>) -> Self {
        Self {
            fragments: fragments.into_iter().collect(),
            delay: None,
        }
    }

    /// Block for `delay` before yielding each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl crate::Source for Replay {
    fn pull(&mut self) -> Option<Fragment> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.fragments.pop_front()
    }
}

/// A mock [crate::Source] fed by a channel.
///
/// The source is exhausted once every [mpsc::Sender] returned by [channel] is dropped.
pub struct Channel {
    receiver: mpsc::Receiver<Fragment>,
}

/// Create a [Channel] source along with the sender that feeds it.
pub fn channel() -> (mpsc::Sender<Fragment>, Channel) {
    let (sender, receiver) = mpsc::channel();
    (sender, Channel { receiver })
}

impl crate::Source for Channel {
    fn pull(&mut self) -> Option<Fragment> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Source;

    #[test]
    fn test_replay_exhausts() {
        let mut source = Replay::new([3, 1, 2]);
        assert_eq!(source.pull(), Some(3));
        assert_eq!(source.pull(), Some(1));
        assert_eq!(source.pull(), Some(2));
        assert_eq!(source.pull(), None);
        assert_eq!(source.pull(), None);
    }

    #[test]
    fn test_channel_exhausts_on_drop() {
        let (sender, mut source) = channel();
        sender.send(9).unwrap();
        drop(sender);
        assert_eq!(source.pull(), Some(9));
        assert_eq!(source.pull(), None);
    }
}
