// element storage of buffered channels.

use crate::util::lock;
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    mem::size_of,
    sync::Mutex,
};


// "target" byte capacity of a segment.
const IDEAL_SEG_BYTES: usize = 1024;

// segment capacity in elems.
//
// ZSTs don't occupy memory, so they just get the byte target as an elem count.
const fn seg_cap<T>() -> usize {
    let elem_size = size_of::<T>();
    if elem_size == 0 {
        IDEAL_SEG_BYTES
    } else if elem_size >= IDEAL_SEG_BYTES {
        // edge case: elem larger than ideal segment capacity
        1
    } else {
        IDEAL_SEG_BYTES / elem_size
    }
}

// FIFO queue of fixed-capacity segments.
//
// growing never moves existing elements, and memory is released a segment at a time as the queue
// drains.
pub(crate) struct SegQueue<T> {
    // total elements in all segments
    len: usize,
    // invariant: no linked segment is empty, and every segment but the front and back is full
    segs: VecDeque<VecDeque<T>>,
    // one empty segment kept around, so that a length fluctuating across a segment boundary
    // doesn't allocate on every push
    spare: Option<VecDeque<T>>,
}

impl<T> SegQueue<T> {
    pub(crate) fn new() -> Self {
        SegQueue { len: 0, segs: VecDeque::new(), spare: None }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn push(&mut self, elem: T) {
        self.len += 1;
        if let Some(back) = self.segs.back_mut().filter(|back| back.len() < seg_cap::<T>()) {
            back.push_back(elem);
            return;
        }
        let mut new_back = self.spare.take()
            .unwrap_or_else(|| VecDeque::with_capacity(seg_cap::<T>()));
        debug_assert!(new_back.is_empty());
        new_back.push_back(elem);
        self.segs.push_back(new_back);
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        let front = self.segs.front_mut()?;
        let elem = front.pop_front();
        debug_assert!(elem.is_some(), "empty segment linked");
        self.len -= 1;
        if front.is_empty() {
            // un-link, then stash or drop
            let emptied = self.segs.pop_front();
            if self.spare.is_none() {
                self.spare = emptied;
            }
        }
        elem
    }

    // whether the recorded length equals the number of elements actually stored.
    pub(crate) fn is_consistent(&self) -> bool {
        self.segs.iter().map(VecDeque::len).sum::<usize>() == self.len
    }
}


/// Thread-safe FIFO queue
///
/// This is the element storage of [`Buffered`](crate::Buffered) channels, usable on its own.
pub struct Queue<T>(Mutex<SegQueue<T>>);

impl<T> Queue<T> {
    /// Construct empty
    pub fn new() -> Self {
        Queue(Mutex::new(SegQueue::new()))
    }

    /// Construct holding a single element
    pub fn with_element(elem: T) -> Self {
        let queue = Queue::new();
        queue.enqueue(elem);
        queue
    }

    /// Push to the back
    pub fn enqueue(&self, elem: T) {
        lock(&self.0).push(elem);
    }

    /// Pop from the front, if not empty
    pub fn dequeue(&self) -> Option<T> {
        lock(&self.0).pop()
    }

    /// Number of elements
    pub fn count(&self) -> usize {
        lock(&self.0).len()
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether the recorded count equals the number of elements actually stored
    ///
    /// Always true unless there is a bug. Used by debug assertions.
    pub fn is_consistent(&self) -> bool {
        lock(&self.0).is_consistent()
    }

    /// Iterator which dequeues until the queue is empty
    ///
    /// Elements enqueued concurrently while draining may be yielded too.
    pub fn drain(&self) -> Drain<'_, T> {
        Drain(self)
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Queue::new()
    }
}

impl<T> Debug for Queue<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Queue").field("count", &self.count()).finish()
    }
}

/// Draining iterator over a [`Queue`], see [`Queue::drain`]
#[derive(Debug)]
pub struct Drain<'a, T>(&'a Queue<T>);

impl<'a, T> Iterator for Drain<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.dequeue()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        cmp::min,
        sync::Arc,
        thread,
    };

    fn new_rng() -> impl Rng {
        Pcg32::from_seed(0xdeadbeefdeadbeefdeadbeefdeadbeefu128.to_le_bytes())
    }

    fn elem_size_test<const ELEM_SIZE: usize>() {
        let mut rng = new_rng();

        for _ in 0..20 {
            let mut queue_1 = VecDeque::<[u8; ELEM_SIZE]>::new();
            let mut queue_2 = SegQueue::<[u8; ELEM_SIZE]>::new();
            for i in 0u32..5_000 {
                if rng.gen_ratio(52, 100) {
                    let mut elem = [0; ELEM_SIZE];
                    let useable_len = min(ELEM_SIZE, 4);
                    (&mut elem[..useable_len]).copy_from_slice(&i.to_ne_bytes()[..useable_len]);
                    queue_1.push_back(elem);
                    queue_2.push(elem);
                } else {
                    assert_eq!(queue_2.pop(), queue_1.pop_front());
                }

                // assert equivalent
                assert_eq!(queue_1.len(), queue_2.len());
                assert!(queue_2.is_consistent());
                let n_segs = queue_2.segs.len();
                for (j, seg) in queue_2.segs.iter().enumerate() {
                    assert!(!seg.is_empty());
                    assert!(seg.len() <= seg_cap::<[u8; ELEM_SIZE]>());
                    if j != 0 && j + 1 != n_segs {
                        // only the first and last segment may be not completely full
                        assert_eq!(seg.len(), seg_cap::<[u8; ELEM_SIZE]>());
                    }
                }
                assert!(queue_2.segs.iter().flatten().eq(queue_1.iter()));
            }
        }
    }

    macro_rules! equivalence_size_tests {
        ($($t:ident $n:expr,)*)=>{
            mod equivalence_size_tests {
                use super::*;

                $(
                    #[test]
                    fn $t() {
                        elem_size_test::<$n>();
                    }
                )*
            }
        };
    }

    equivalence_size_tests!(
        _0 0,
        _1 1,
        _4 4,
        _24 24,
        _512 512,
        _1024 1024,
        _4096 4096,
    );

    #[test]
    fn spare_segment_reused() {
        let mut queue = SegQueue::new();
        let cap = seg_cap::<u64>();
        for i in 0..cap as u64 + 1 {
            queue.push(i);
        }
        for _ in 0..cap {
            queue.pop();
        }
        assert!(queue.spare.is_some());
        assert_eq!(queue.len(), 1);
        for i in 0..cap as u64 {
            queue.push(i);
        }
        assert_eq!(queue.segs.len(), 2);
        assert!(queue.spare.is_none());
    }

    #[test]
    fn fifo_round_trip() {
        let queue = Queue::with_element(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert_eq!(queue.count(), 3);
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_resumes_after_enqueue() {
        let queue = Queue::new();
        queue.enqueue('a');
        queue.enqueue('b');
        let mut drain = queue.drain();
        assert_eq!(drain.next(), Some('a'));
        assert_eq!(drain.next(), Some('b'));
        assert_eq!(drain.next(), None);

        queue.enqueue('c');
        assert_eq!(drain.next(), Some('c'));
        assert_eq!(queue.drain().count(), 0);
        assert!(queue.is_consistent());
    }

    #[test]
    fn concurrent_enqueue() {
        let queue = Arc::new(Queue::new());
        let joins = (0..4u32)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..1000 {
                        queue.enqueue(t * 1000 + i);
                    }
                })
            })
            .collect::<Vec<_>>();
        for join in joins {
            join.join().unwrap();
        }
        assert_eq!(queue.count(), 4000);
        assert!(queue.is_consistent());

        let drained = queue.drain().collect::<Vec<_>>();
        assert!(queue.is_empty());
        // each producer's elements stay in order
        for t in 0..4 {
            let own = drained.iter().copied().filter(|&n| n / 1000 == t).collect::<Vec<_>>();
            assert_eq!(own, (t * 1000..(t + 1) * 1000).collect::<Vec<_>>());
        }
    }
}
