// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays panel storage: allocation, topology and per-panel state.
//!
//! The arena knows nothing about viewing; the view drives it.

use std::collections::HashMap;

use kurbo::Rect;

use super::id::PanelId;
use super::identity::encode_identity;
use super::{AutoExpansionThreshold, NoticeFlags, PanelBehavior, PanelFlags, PanelRect};
use crate::paint::Color;
use crate::scheduler::INVALID;

/// Layout of a freshly created child: far outside its parent.
pub(crate) const UNPLACED_LAYOUT: PanelRect = PanelRect::new(-2.0, -2.0, 1.0, 1.0);

#[derive(Default)]
pub(crate) struct PanelTree {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) last_child: Vec<u32>,
    pub(crate) prev: Vec<u32>,
    pub(crate) next: Vec<u32>,
    pub(crate) name: Vec<String>,
    pub(crate) child_index: Vec<HashMap<String, u32>>,

    // -- Layout (set through the view) --
    pub(crate) layout: Vec<PanelRect>,
    pub(crate) canvas_color: Vec<Color>,

    // -- Viewing (computed by the view) --
    pub(crate) viewed: Vec<PanelRect>,
    pub(crate) clip: Vec<Rect>,

    // -- State --
    pub(crate) flags: Vec<PanelFlags>,
    pub(crate) ae_threshold: Vec<AutoExpansionThreshold>,
    pub(crate) pending_notice: Vec<NoticeFlags>,
    pub(crate) creation_number: Vec<u64>,
    pub(crate) behavior: Vec<Option<Box<dyn PanelBehavior>>>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) count: usize,
}

impl PanelTree {
    // -- Allocation --

    /// Allocates a detached panel slot.
    pub(crate) fn alloc(
        &mut self,
        name: &str,
        behavior: Box<dyn PanelBehavior>,
        creation_number: u64,
    ) -> u32 {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generation[i] = self.generation[i].wrapping_add(1);
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.last_child[i] = INVALID;
            self.prev[i] = INVALID;
            self.next[i] = INVALID;
            name.clone_into(&mut self.name[i]);
            self.child_index[i].clear();
            self.layout[i] = UNPLACED_LAYOUT;
            self.canvas_color[i] = Color::TRANSPARENT;
            self.viewed[i] = PanelRect::new(-1.0, -1.0, 1.0, 1.0);
            self.clip[i] = Rect::ZERO;
            self.flags[i] = PanelFlags::empty();
            self.ae_threshold[i] = AutoExpansionThreshold::DEFAULT;
            self.pending_notice[i] = NoticeFlags::empty();
            self.creation_number[i] = creation_number;
            self.behavior[i] = Some(behavior);
            self.alive[i] = true;
            idx
        } else {
            let idx = u32::try_from(self.parent.len()).unwrap_or(INVALID);
            assert!(idx != INVALID, "panel arena exhausted");
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.last_child.push(INVALID);
            self.prev.push(INVALID);
            self.next.push(INVALID);
            self.name.push(name.to_owned());
            self.child_index.push(HashMap::new());
            self.layout.push(UNPLACED_LAYOUT);
            self.canvas_color.push(Color::TRANSPARENT);
            self.viewed.push(PanelRect::new(-1.0, -1.0, 1.0, 1.0));
            self.clip.push(Rect::ZERO);
            self.flags.push(PanelFlags::empty());
            self.ae_threshold.push(AutoExpansionThreshold::DEFAULT);
            self.pending_notice.push(NoticeFlags::empty());
            self.creation_number.push(creation_number);
            self.behavior.push(Some(behavior));
            self.generation.push(0);
            self.alive.push(true);
            idx
        };
        self.count += 1;
        idx
    }

    /// Frees a detached, childless slot. Returns the behavior if it was not
    /// lent out.
    pub(crate) fn free(&mut self, idx: u32) -> Option<Box<dyn PanelBehavior>> {
        let i = idx as usize;
        debug_assert!(
            self.first_child[i] == INVALID && self.parent[i] == INVALID,
            "freeing a linked panel"
        );
        self.alive[i] = false;
        self.generation[i] = self.generation[i].wrapping_add(1);
        self.flags[i] = PanelFlags::empty();
        self.free_list.push(idx);
        self.count -= 1;
        self.behavior[i].take()
    }

    #[inline]
    pub(crate) fn is_alive(&self, id: PanelId) -> bool {
        let i = id.idx as usize;
        i < self.alive.len() && self.alive[i] && self.generation[i] == id.generation
    }

    /// Returns the slot of a live handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[inline]
    pub(crate) fn slot(&self, id: PanelId) -> u32 {
        assert!(self.is_alive(id), "stale panel handle {id:?}");
        id.idx
    }

    #[inline]
    pub(crate) fn id(&self, idx: u32) -> PanelId {
        PanelId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    #[inline]
    pub(crate) fn opt_id(&self, idx: u32) -> Option<PanelId> {
        (idx != INVALID).then(|| self.id(idx))
    }

    // -- Flags --

    #[inline]
    pub(crate) fn has(&self, idx: u32, flag: PanelFlags) -> bool {
        self.flags[idx as usize].contains(flag)
    }

    #[inline]
    pub(crate) fn set(&mut self, idx: u32, flag: PanelFlags, value: bool) {
        self.flags[idx as usize].set(flag, value);
    }

    /// Layout height of a panel, its tallness in its own coordinates.
    #[inline]
    pub(crate) fn height(&self, idx: u32) -> f64 {
        self.layout[idx as usize].height
    }

    // -- Topology --

    /// Links a detached slot as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` already has a child of the same name.
    pub(crate) fn link_last(&mut self, parent: u32, idx: u32) {
        let p = parent as usize;
        let name = self.name[idx as usize].clone();
        if self.child_index[p].contains_key(&name) {
            let parent_identity = self.identity(parent);
            panic!("panel name \"{name}\" not unique within \"{parent_identity}\"");
        }
        self.child_index[p].insert(name, idx);
        self.parent[idx as usize] = parent;
        let last = self.last_child[p];
        self.prev[idx as usize] = last;
        self.next[idx as usize] = INVALID;
        if last == INVALID {
            self.first_child[p] = idx;
        } else {
            self.next[last as usize] = idx;
        }
        self.last_child[p] = idx;
    }

    /// Removes a slot from its parent's child list and name index.
    pub(crate) fn unlink(&mut self, idx: u32) {
        let i = idx as usize;
        let parent = self.parent[i];
        if parent == INVALID {
            return;
        }
        self.detach_siblings(idx);
        self.child_index[parent as usize].remove(&self.name[i]);
        self.parent[i] = INVALID;
    }

    /// Takes a slot out of the sibling chain, keeping its parent.
    fn detach_siblings(&mut self, idx: u32) {
        let i = idx as usize;
        let parent = self.parent[i] as usize;
        let (prev, next) = (self.prev[i], self.next[i]);
        if prev == INVALID {
            self.first_child[parent] = next;
        } else {
            self.next[prev as usize] = next;
        }
        if next == INVALID {
            self.last_child[parent] = prev;
        } else {
            self.prev[next as usize] = prev;
        }
        self.prev[i] = INVALID;
        self.next[i] = INVALID;
    }

    /// Re-inserts a sibling-detached slot right before `sister`, or last when
    /// `sister` is `INVALID`.
    fn insert_before(&mut self, idx: u32, sister: u32) {
        let i = idx as usize;
        let parent = self.parent[i] as usize;
        let prev = if sister == INVALID {
            self.last_child[parent]
        } else {
            self.prev[sister as usize]
        };
        self.prev[i] = prev;
        self.next[i] = sister;
        if prev == INVALID {
            self.first_child[parent] = idx;
        } else {
            self.next[prev as usize] = idx;
        }
        if sister == INVALID {
            self.last_child[parent] = idx;
        } else {
            self.prev[sister as usize] = idx;
        }
    }

    /// Moves a child right before `sister` (or to the end for `INVALID`).
    /// Returns whether the order changed.
    pub(crate) fn move_before(&mut self, idx: u32, sister: u32) -> bool {
        if sister == idx || self.next[idx as usize] == sister {
            return false;
        }
        self.detach_siblings(idx);
        self.insert_before(idx, sister);
        true
    }

    /// Replaces the child order of `parent` with `order`, a permutation of
    /// its current children. Returns whether anything moved.
    pub(crate) fn reorder_children(&mut self, parent: u32, order: &[u32]) -> bool {
        let mut changed = false;
        let mut prev = INVALID;
        let mut expected = self.first_child[parent as usize];
        for &c in order {
            if c != expected {
                changed = true;
            }
            expected = self.next[c as usize];
        }
        if !changed {
            return false;
        }
        for &c in order {
            self.prev[c as usize] = prev;
            if prev == INVALID {
                self.first_child[parent as usize] = c;
            } else {
                self.next[prev as usize] = c;
            }
            prev = c;
        }
        self.next[prev as usize] = INVALID;
        self.last_child[parent as usize] = prev;
        true
    }

    pub(crate) fn children(&self, idx: u32) -> Children<'_> {
        Children {
            tree: self,
            current: self.first_child[idx as usize],
        }
    }

    pub(crate) fn child_slots(&self, idx: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut c = self.first_child[idx as usize];
        while c != INVALID {
            out.push(c);
            c = self.next[c as usize];
        }
        out
    }

    /// Pre-order successor of `idx` within the subtree of `top`, or `INVALID`.
    pub(crate) fn next_in_subtree(&self, idx: u32, top: u32) -> u32 {
        let first = self.first_child[idx as usize];
        if first != INVALID {
            return first;
        }
        self.next_skipping_children(idx, top)
    }

    /// Pre-order successor of `idx` within `top`, skipping the children of
    /// `idx`.
    pub(crate) fn next_skipping_children(&self, mut idx: u32, top: u32) -> u32 {
        loop {
            if idx == top {
                return INVALID;
            }
            let next = self.next[idx as usize];
            if next != INVALID {
                return next;
            }
            idx = self.parent[idx as usize];
            if idx == INVALID {
                return INVALID;
            }
        }
    }

    pub(crate) fn get_child(&self, idx: u32, name: &str) -> u32 {
        self.child_index[idx as usize]
            .get(name)
            .copied()
            .unwrap_or(INVALID)
    }

    pub(crate) fn is_ancestor_or_self(&self, ancestor: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == ancestor {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    pub(crate) fn identity(&self, idx: u32) -> String {
        let mut names = Vec::new();
        let mut p = idx;
        while p != INVALID {
            names.push(self.name[p as usize].as_str());
            p = self.parent[p as usize];
        }
        names.reverse();
        encode_identity(&names)
    }

    // -- Focusable navigation --

    pub(crate) fn focusable_parent(&self, idx: u32) -> u32 {
        let mut p = self.parent[idx as usize];
        while p != INVALID && !self.has(p, PanelFlags::FOCUSABLE) {
            p = self.parent[p as usize];
        }
        p
    }

    /// First focusable panel in pre-order among the descendants, not
    /// descending into focusable ones.
    pub(crate) fn focusable_first_child(&self, idx: u32) -> u32 {
        let mut p = self.first_child[idx as usize];
        if p == INVALID {
            return INVALID;
        }
        loop {
            if self.has(p, PanelFlags::FOCUSABLE) {
                return p;
            }
            if self.first_child[p as usize] != INVALID {
                p = self.first_child[p as usize];
            } else {
                while self.next[p as usize] == INVALID {
                    p = self.parent[p as usize];
                    if p == idx {
                        return INVALID;
                    }
                }
                p = self.next[p as usize];
            }
        }
    }

    pub(crate) fn focusable_last_child(&self, idx: u32) -> u32 {
        let mut p = self.last_child[idx as usize];
        if p == INVALID {
            return INVALID;
        }
        loop {
            if self.has(p, PanelFlags::FOCUSABLE) {
                return p;
            }
            if self.last_child[p as usize] != INVALID {
                p = self.last_child[p as usize];
            } else {
                while self.prev[p as usize] == INVALID {
                    p = self.parent[p as usize];
                    if p == idx {
                        return INVALID;
                    }
                }
                p = self.prev[p as usize];
            }
        }
    }

    pub(crate) fn focusable_prev(&self, idx: u32) -> u32 {
        let mut p = idx;
        loop {
            while self.prev[p as usize] == INVALID {
                p = self.parent[p as usize];
                if p == INVALID || self.has(p, PanelFlags::FOCUSABLE) {
                    return INVALID;
                }
            }
            p = self.prev[p as usize];
            loop {
                if self.has(p, PanelFlags::FOCUSABLE) {
                    return p;
                }
                let last = self.last_child[p as usize];
                if last == INVALID {
                    break;
                }
                p = last;
            }
        }
    }

    pub(crate) fn focusable_next(&self, idx: u32) -> u32 {
        let mut p = idx;
        loop {
            while self.next[p as usize] == INVALID {
                p = self.parent[p as usize];
                if p == INVALID || self.has(p, PanelFlags::FOCUSABLE) {
                    return INVALID;
                }
            }
            p = self.next[p as usize];
            loop {
                if self.has(p, PanelFlags::FOCUSABLE) {
                    return p;
                }
                let first = self.first_child[p as usize];
                if first == INVALID {
                    break;
                }
                p = first;
            }
        }
    }
}

/// An iterator over the direct children of a panel, in order.
///
/// Created by [`View::children`](crate::view::View::children).
#[derive(Debug)]
pub struct Children<'a> {
    tree: &'a PanelTree,
    current: u32,
}

impl Iterator for Children<'_> {
    type Item = PanelId;

    fn next(&mut self) -> Option<PanelId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.tree.next[idx as usize];
        Some(self.tree.id(idx))
    }
}

impl core::fmt::Debug for PanelTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PanelTree")
            .field("count", &self.count)
            .field("slots", &self.parent.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;
    impl PanelBehavior for Nothing {}

    fn tree_with(names: &[&str]) -> (PanelTree, u32, Vec<u32>) {
        let mut t = PanelTree::default();
        let root = t.alloc("root", Box::new(Nothing), 0);
        t.set(root, PanelFlags::FOCUSABLE, true);
        let kids = names
            .iter()
            .map(|n| {
                let c = t.alloc(n, Box::new(Nothing), 0);
                t.set(c, PanelFlags::FOCUSABLE, true);
                t.link_last(root, c);
                c
            })
            .collect();
        (t, root, kids)
    }

    fn order(t: &PanelTree, root: u32) -> Vec<String> {
        t.child_slots(root)
            .into_iter()
            .map(|c| t.name[c as usize].clone())
            .collect()
    }

    #[test]
    fn linking_and_reordering() {
        let (mut t, root, kids) = tree_with(&["a", "b", "c"]);
        assert_eq!(order(&t, root), ["a", "b", "c"]);
        assert!(t.move_before(kids[2], kids[0]));
        assert_eq!(order(&t, root), ["c", "a", "b"]);
        assert!(!t.move_before(kids[0], kids[1]), "already there");
        assert!(t.move_before(kids[2], INVALID));
        assert_eq!(order(&t, root), ["a", "b", "c"]);
        assert!(t.reorder_children(root, &[kids[1], kids[2], kids[0]]));
        assert_eq!(order(&t, root), ["b", "c", "a"]);
        assert_eq!(t.last_child[root as usize], kids[0]);
        assert!(!t.reorder_children(root, &[kids[1], kids[2], kids[0]]));
    }

    #[test]
    fn unlink_and_reuse_bumps_generation() {
        let (mut t, root, kids) = tree_with(&["a", "b"]);
        let old = t.id(kids[0]);
        t.unlink(kids[0]);
        assert!(t.free(kids[0]).is_some());
        assert!(!t.is_alive(old));
        assert_eq!(t.get_child(root, "a"), INVALID);
        let again = t.alloc("a", Box::new(Nothing), 1);
        assert_eq!(again, kids[0], "slot reused");
        assert_ne!(t.id(again), old);
        t.link_last(root, again);
        assert_eq!(order(&t, root), ["b", "a"]);
    }

    #[test]
    #[should_panic(expected = "not unique")]
    fn duplicate_names_panic() {
        let (mut t, root, _) = tree_with(&["a"]);
        let dup = t.alloc("a", Box::new(Nothing), 0);
        t.link_last(root, dup);
    }

    #[test]
    fn focusable_navigation_skips_unfocusable() {
        let (mut t, root, kids) = tree_with(&["a", "b", "c"]);
        t.set(kids[1], PanelFlags::FOCUSABLE, false);
        let inner = t.alloc("inner", Box::new(Nothing), 0);
        t.set(inner, PanelFlags::FOCUSABLE, true);
        t.link_last(kids[1], inner);

        assert_eq!(t.focusable_next(kids[0]), inner);
        assert_eq!(t.focusable_next(inner), kids[2]);
        assert_eq!(t.focusable_prev(kids[2]), inner);
        assert_eq!(t.focusable_parent(inner), root);
        assert_eq!(t.focusable_first_child(root), kids[0]);
        assert_eq!(t.focusable_last_child(kids[1]), inner);
        assert_eq!(t.focusable_next(kids[2]), INVALID);
        assert_eq!(t.identity(inner), "root:b:inner");
    }
}
