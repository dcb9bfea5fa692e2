// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena of engine/signal subscription links.
//!
//! Every subscription is one [`Link`] record that sits in two intrusive
//! doubly linked lists at once: the list of signals the engine listens to and
//! the list of engines the signal wakes. A `(engine, signal)` map finds the
//! record for a pair in O(1), so subscribing and unsubscribing never scan
//! either list. Records are addressed by slot index and recycled through a
//! free list.

use std::collections::HashMap;

use super::id::INVALID;

#[derive(Clone, Copy, Debug)]
struct Link {
    engine: u32,
    signal: u32,
    ref_count: u32,
    engine_prev: u32,
    engine_next: u32,
    signal_prev: u32,
    signal_next: u32,
}

/// Subscription storage keyed by raw engine and signal slot indices.
///
/// Callers validate handles before reaching this layer; the arena only ever
/// sees live slots.
#[derive(Debug, Default)]
pub(crate) struct LinkArena {
    links: Vec<Link>,
    free: Vec<u32>,
    by_pair: HashMap<(u32, u32), u32>,
    engine_head: Vec<u32>,
    signal_head: Vec<u32>,
}

impl LinkArena {
    /// Makes room for engine slot `idx` and resets its list.
    pub(crate) fn reset_engine(&mut self, idx: u32) {
        let i = idx as usize;
        if self.engine_head.len() <= i {
            self.engine_head.resize(i + 1, INVALID);
        }
        self.engine_head[i] = INVALID;
    }

    /// Makes room for signal slot `idx` and resets its list.
    pub(crate) fn reset_signal(&mut self, idx: u32) {
        let i = idx as usize;
        if self.signal_head.len() <= i {
            self.signal_head.resize(i + 1, INVALID);
        }
        self.signal_head[i] = INVALID;
    }

    /// Adds one reference to the `(engine, signal)` subscription, creating the
    /// link on first use. Returns the new reference count.
    pub(crate) fn subscribe(&mut self, engine: u32, signal: u32) -> u32 {
        if let Some(&l) = self.by_pair.get(&(engine, signal)) {
            let link = &mut self.links[l as usize];
            link.ref_count += 1;
            return link.ref_count;
        }

        let engine_next = self.engine_head[engine as usize];
        let signal_next = self.signal_head[signal as usize];
        let link = Link {
            engine,
            signal,
            ref_count: 1,
            engine_prev: INVALID,
            engine_next,
            signal_prev: INVALID,
            signal_next,
        };
        let l = if let Some(l) = self.free.pop() {
            self.links[l as usize] = link;
            l
        } else {
            let l = u32::try_from(self.links.len()).unwrap_or(INVALID);
            assert!(l != INVALID, "subscription arena exhausted");
            self.links.push(link);
            l
        };
        if engine_next != INVALID {
            self.links[engine_next as usize].engine_prev = l;
        }
        if signal_next != INVALID {
            self.links[signal_next as usize].signal_prev = l;
        }
        self.engine_head[engine as usize] = l;
        self.signal_head[signal as usize] = l;
        self.by_pair.insert((engine, signal), l);
        1
    }

    /// Drops one reference to the `(engine, signal)` subscription. Returns the
    /// remaining count, or `None` if the pair was not subscribed.
    pub(crate) fn unsubscribe(&mut self, engine: u32, signal: u32) -> Option<u32> {
        let l = *self.by_pair.get(&(engine, signal))?;
        let link = &mut self.links[l as usize];
        link.ref_count -= 1;
        let remaining = link.ref_count;
        if remaining == 0 {
            self.unlink(l);
        }
        Some(remaining)
    }

    /// Returns the reference count of a subscription (0 if absent).
    pub(crate) fn ref_count(&self, engine: u32, signal: u32) -> u32 {
        self.by_pair
            .get(&(engine, signal))
            .map_or(0, |&l| self.links[l as usize].ref_count)
    }

    /// Removes every subscription of an engine.
    pub(crate) fn remove_engine(&mut self, engine: u32) {
        while self.engine_head[engine as usize] != INVALID {
            let l = self.engine_head[engine as usize];
            self.unlink(l);
        }
    }

    /// Removes every subscription to a signal.
    pub(crate) fn remove_signal(&mut self, signal: u32) {
        while self.signal_head[signal as usize] != INVALID {
            let l = self.signal_head[signal as usize];
            self.unlink(l);
        }
    }

    /// Appends the engine slots subscribed to `signal` to `out`.
    pub(crate) fn collect_subscribers(&self, signal: u32, out: &mut Vec<u32>) {
        let mut l = self.signal_head[signal as usize];
        while l != INVALID {
            let link = &self.links[l as usize];
            out.push(link.engine);
            l = link.signal_next;
        }
    }

    /// Number of distinct engines subscribed to `signal`.
    pub(crate) fn subscriber_count(&self, signal: u32) -> usize {
        let mut n = 0;
        let mut l = self.signal_head[signal as usize];
        while l != INVALID {
            n += 1;
            l = self.links[l as usize].signal_next;
        }
        n
    }

    /// Number of distinct signals `engine` is subscribed to.
    pub(crate) fn subscription_count(&self, engine: u32) -> usize {
        let mut n = 0;
        let mut l = self.engine_head[engine as usize];
        while l != INVALID {
            n += 1;
            l = self.links[l as usize].engine_next;
        }
        n
    }

    /// Number of live link records.
    pub(crate) fn len(&self) -> usize {
        self.by_pair.len()
    }

    fn unlink(&mut self, l: u32) {
        let link = self.links[l as usize];

        if link.engine_prev != INVALID {
            self.links[link.engine_prev as usize].engine_next = link.engine_next;
        } else {
            self.engine_head[link.engine as usize] = link.engine_next;
        }
        if link.engine_next != INVALID {
            self.links[link.engine_next as usize].engine_prev = link.engine_prev;
        }

        if link.signal_prev != INVALID {
            self.links[link.signal_prev as usize].signal_next = link.signal_next;
        } else {
            self.signal_head[link.signal as usize] = link.signal_next;
        }
        if link.signal_next != INVALID {
            self.links[link.signal_next as usize].signal_prev = link.signal_prev;
        }

        self.by_pair.remove(&(link.engine, link.signal));
        self.links[l as usize].ref_count = 0;
        self.free.push(l);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(engines: u32, signals: u32) -> LinkArena {
        let mut a = LinkArena::default();
        for e in 0..engines {
            a.reset_engine(e);
        }
        for s in 0..signals {
            a.reset_signal(s);
        }
        a
    }

    #[test]
    fn repeated_subscribe_shares_one_link() {
        let mut a = arena(1, 1);
        assert_eq!(a.subscribe(0, 0), 1);
        assert_eq!(a.subscribe(0, 0), 2);
        assert_eq!(a.len(), 1, "one record per pair");
        assert_eq!(a.unsubscribe(0, 0), Some(1));
        assert_eq!(a.unsubscribe(0, 0), Some(0));
        assert_eq!(a.len(), 0);
        assert_eq!(a.unsubscribe(0, 0), None, "absent pair");
    }

    #[test]
    fn lists_stay_consistent_when_unlinking_from_the_middle() {
        let mut a = arena(3, 2);
        for e in 0..3 {
            a.subscribe(e, 0);
            a.subscribe(e, 1);
        }
        a.unsubscribe(1, 0);

        let mut subs = Vec::new();
        a.collect_subscribers(0, &mut subs);
        subs.sort_unstable();
        assert_eq!(subs, [0, 2]);
        assert_eq!(a.subscription_count(1), 1);
        assert_eq!(a.subscriber_count(1), 3);
    }

    #[test]
    fn remove_engine_and_signal_free_all_records() {
        let mut a = arena(2, 2);
        a.subscribe(0, 0);
        a.subscribe(0, 1);
        a.subscribe(1, 1);
        a.remove_engine(0);
        assert_eq!(a.len(), 1);
        assert_eq!(a.subscriber_count(0), 0);
        a.remove_signal(1);
        assert_eq!(a.len(), 0);
        assert_eq!(a.subscription_count(1), 0);

        // Freed records are reused.
        a.subscribe(1, 0);
        assert_eq!(a.links.len(), 3, "no growth after reuse");
    }
}
