use super::events::FrameEvent;
use crate::protocol::{FrameTree, ProtocolFrame};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Why a frame left the tree (`Page.frameDetached` reason)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// The frame and its subtree are gone
    Remove,
    /// The frame moved to another process; it keeps existing
    Swap,
}

impl DetachReason {
    pub fn from_protocol(reason: &str) -> Self {
        if reason.eq_ignore_ascii_case("swap") {
            DetachReason::Swap
        } else {
            DetachReason::Remove
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FrameEntry {
    parent_id: Option<String>,
    children: Vec<String>,
    owner_session: Option<String>,
    last_seen: Option<ProtocolFrame>,
}

/// Authoritative frame topology and frame → session ownership for one page.
///
/// The registry is the single writer of this state. Everything else reads it
/// through the accessor methods.
#[derive(Debug, Clone)]
pub struct FrameRegistry {
    root_id: String,
    frames: IndexMap<String, FrameEntry>,
    session_frames: HashMap<String, BTreeSet<String>>,
}

impl FrameRegistry {
    /// Create a registry holding only the main frame
    pub fn new(root_frame_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        let root_id = root_frame_id.into();
        let mut registry = Self {
            root_id: root_id.clone(),
            frames: IndexMap::new(),
            session_frames: HashMap::new(),
        };
        registry.frames.insert(root_id.clone(), FrameEntry::default());
        registry.set_owner(&root_id, &session_id.into());
        registry
    }

    /// Build a registry from a `Page.getFrameTree` result
    pub fn from_frame_tree(tree: &FrameTree, session_id: &str) -> Self {
        let mut registry = Self::new(tree.frame.id.clone(), session_id);
        registry.seed_from_frame_tree(tree, session_id);
        registry
    }

    pub fn on_frame_attached(&mut self, frame_id: &str, parent_id: Option<&str>, session_id: &str) {
        match parent_id {
            None => {
                if frame_id != self.root_id {
                    self.rename_root(frame_id);
                }
            }
            Some(parent) => self.link(frame_id, parent),
        }
        self.set_owner(frame_id, session_id);
    }

    pub fn on_frame_navigated(&mut self, frame: ProtocolFrame, session_id: &str) {
        let frame_id = frame.id.clone();
        match frame.parent_id.as_deref() {
            None => {
                if frame_id != self.root_id {
                    self.rename_root(&frame_id);
                }
            }
            Some(parent) => {
                if self.parent_of(&frame_id) != Some(parent) {
                    self.link(&frame_id, parent);
                }
            }
        }
        if let Some(entry) = self.frames.get_mut(&frame_id) {
            entry.last_seen = Some(frame);
        }
        self.set_owner(&frame_id, session_id);
    }

    pub fn on_frame_detached(&mut self, frame_id: &str, reason: DetachReason) {
        if reason == DetachReason::Swap {
            return;
        }
        self.remove_subtree(frame_id);
    }

    /// Apply one lifecycle event reported by `session_id`
    pub fn apply(&mut self, event: FrameEvent, session_id: &str) {
        match event {
            FrameEvent::Attached { frame_id, parent_id } => {
                self.on_frame_attached(&frame_id, parent_id.as_deref(), session_id)
            }
            FrameEvent::Navigated(frame) => self.on_frame_navigated(frame, session_id),
            FrameEvent::Detached { frame_id, reason } => self.on_frame_detached(&frame_id, reason),
        }
    }

    /// An out-of-process iframe got its own session; it now owns `frame_id`
    pub fn adopt_child_session(&mut self, session_id: &str, frame_id: &str, parent_id: Option<&str>) {
        if !self.frames.contains_key(frame_id) {
            let parent = parent_id.unwrap_or(self.root_id.as_str()).to_string();
            self.link(frame_id, &parent);
        }
        self.set_owner(frame_id, session_id);
    }

    /// Merge a frame tree snapshot; frames already owned keep their owner
    pub fn seed_from_frame_tree(&mut self, tree: &FrameTree, session_id: &str) {
        if tree.frame.id != self.root_id {
            self.rename_root(&tree.frame.id);
        }

        let mut stack: Vec<(&FrameTree, Option<&str>)> = vec![(tree, None)];
        while let Some((node, parent)) = stack.pop() {
            let id = node.frame.id.as_str();
            if let Some(parent) = parent {
                if self.parent_of(id) != Some(parent) {
                    self.link(id, parent);
                }
            }
            if let Some(entry) = self.frames.get_mut(id) {
                entry.last_seen = Some(node.frame.clone());
            }
            if self.owner_session_id(id).is_none() {
                self.set_owner(id, session_id);
            }
            for child in node.child_frames.iter().rev() {
                stack.push((child, Some(id)));
            }
        }
    }

    pub fn main_frame_id(&self) -> &str {
        &self.root_id
    }

    pub fn contains(&self, frame_id: &str) -> bool {
        self.frames.contains_key(frame_id)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn parent_of(&self, frame_id: &str) -> Option<&str> {
        self.frames.get(frame_id)?.parent_id.as_deref()
    }

    pub fn children_of(&self, frame_id: &str) -> &[String] {
        self.frames.get(frame_id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    pub fn owner_session_id(&self, frame_id: &str) -> Option<&str> {
        self.frames.get(frame_id)?.owner_session.as_deref()
    }

    pub fn last_seen(&self, frame_id: &str) -> Option<&ProtocolFrame> {
        self.frames.get(frame_id)?.last_seen.as_ref()
    }

    pub fn frames_for_session(&self, session_id: &str) -> Vec<String> {
        self.session_frames
            .get(session_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Distinct sessions owning at least one frame, in frame order
    pub fn sessions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.list_all_frames()
            .iter()
            .filter_map(|f| self.owner_session_id(f))
            .filter(|s| seen.insert(s.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Every reachable frame, root first, depth-first; parents precede children
    pub fn list_all_frames(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.frames.len());
        let mut visited = HashSet::new();
        let mut stack = vec![self.root_id.as_str()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            out.push(id.to_string());
            for child in self.children_of(id).iter().rev() {
                stack.push(child.as_str());
            }
        }
        out
    }

    /// Rebuild a `Page.FrameTree` rooted at `root_id`
    pub fn as_protocol_frame_tree(&self, root_id: &str) -> Option<FrameTree> {
        if !self.frames.contains_key(root_id) {
            return None;
        }
        let order = {
            let mut order = Vec::new();
            let mut visited = HashSet::new();
            let mut stack = vec![root_id];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                order.push(id);
                for child in self.children_of(id).iter().rev() {
                    stack.push(child.as_str());
                }
            }
            order
        };

        // Assemble bottom-up so no recursion is needed.
        let mut built: HashMap<&str, FrameTree> = HashMap::new();
        for id in order.iter().rev() {
            let frame = self
                .last_seen(id)
                .cloned()
                .unwrap_or_else(|| ProtocolFrame::new(*id, self.parent_of(id)));
            let child_frames = self
                .children_of(id)
                .iter()
                .filter_map(|c| built.remove(c.as_str()))
                .collect();
            built.insert(*id, FrameTree { frame, child_frames });
        }
        built.remove(root_id)
    }

    fn link(&mut self, frame_id: &str, parent_id: &str) {
        if !self.frames.contains_key(parent_id) {
            log::warn!("Frame {} attached under unknown parent {}; parenting it to the main frame", frame_id, parent_id);
            let root = self.root_id.clone();
            if parent_id != root {
                self.link(parent_id, &root);
            }
        }

        if let Some(old_parent) = self.parent_of(frame_id).map(str::to_string) {
            if let Some(entry) = self.frames.get_mut(&old_parent) {
                entry.children.retain(|c| c != frame_id);
            }
        }

        let entry = self.frames.entry(frame_id.to_string()).or_default();
        entry.parent_id = Some(parent_id.to_string());

        if let Some(parent) = self.frames.get_mut(parent_id) {
            if !parent.children.iter().any(|c| c == frame_id) {
                parent.children.push(frame_id.to_string());
            }
        }
    }

    fn set_owner(&mut self, frame_id: &str, session_id: &str) {
        let Some(entry) = self.frames.get_mut(frame_id) else {
            return;
        };
        if let Some(old) = entry.owner_session.replace(session_id.to_string()) {
            if old != session_id {
                Self::unindex(&mut self.session_frames, &old, frame_id);
            }
        }
        self.session_frames
            .entry(session_id.to_string())
            .or_default()
            .insert(frame_id.to_string());
    }

    fn unindex(index: &mut HashMap<String, BTreeSet<String>>, session_id: &str, frame_id: &str) {
        if let Some(set) = index.get_mut(session_id) {
            set.remove(frame_id);
            if set.is_empty() {
                index.remove(session_id);
            }
        }
    }

    /// Same-navigation root replacement: keep the node, change its id everywhere
    fn rename_root(&mut self, new_id: &str) {
        let old_id = self.root_id.clone();
        log::debug!("Main frame swapped {} -> {}", old_id, new_id);

        // A frame already known under the new id is folded into the root.
        let mut absorbed_children = Vec::new();
        if let Some(existing) = self.frames.shift_remove(new_id) {
            if let Some(parent) = existing.parent_id.as_deref() {
                if let Some(p) = self.frames.get_mut(parent) {
                    p.children.retain(|c| c != new_id);
                }
            }
            if let Some(owner) = existing.owner_session.as_deref() {
                Self::unindex(&mut self.session_frames, owner, new_id);
            }
            absorbed_children = existing.children;
        }

        let mut entry = self.frames.shift_remove(&old_id).unwrap_or_default();
        entry.parent_id = None;
        for child in absorbed_children {
            if !entry.children.contains(&child) {
                entry.children.push(child);
            }
        }
        for child in &entry.children {
            if let Some(c) = self.frames.get_mut(child) {
                c.parent_id = Some(new_id.to_string());
            }
        }
        if let Some(owner) = entry.owner_session.clone() {
            Self::unindex(&mut self.session_frames, &owner, &old_id);
            self.session_frames.entry(owner).or_default().insert(new_id.to_string());
        }
        self.frames.insert(new_id.to_string(), entry);
        self.root_id = new_id.to_string();
    }

    fn remove_subtree(&mut self, frame_id: &str) {
        if !self.frames.contains_key(frame_id) {
            return;
        }
        if let Some(parent) = self.parent_of(frame_id).map(str::to_string) {
            if let Some(p) = self.frames.get_mut(&parent) {
                p.children.retain(|c| c != frame_id);
            }
        }

        let root_owner = self.owner_session_id(&self.root_id).map(str::to_string);
        let mut stack = vec![frame_id.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.frames.shift_remove(&id) {
                if let Some(owner) = entry.owner_session.as_deref() {
                    Self::unindex(&mut self.session_frames, owner, &id);
                }
                stack.extend(entry.children);
            }
        }

        if !self.frames.contains_key(&self.root_id) {
            match self.frames.keys().next().cloned() {
                Some(promoted) => {
                    log::debug!("Main frame {} removed; promoting {}", self.root_id, promoted);
                    if let Some(entry) = self.frames.get_mut(&promoted) {
                        entry.parent_id = None;
                    }
                    self.root_id = promoted;
                }
                None => {
                    let root = self.root_id.clone();
                    self.frames.insert(root.clone(), FrameEntry::default());
                    if let Some(owner) = root_owner {
                        self.set_owner(&root, &owner);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FrameRegistry {
        let mut reg = FrameRegistry::new("main", "s-main");
        reg.on_frame_attached("a", Some("main"), "s-main");
        reg.on_frame_attached("a1", Some("a"), "s-main");
        reg.on_frame_attached("b", Some("main"), "s-main");
        reg.adopt_child_session("s-oopif", "b", None);
        reg.on_frame_attached("b1", Some("b"), "s-oopif");
        reg
    }

    fn assert_topological(reg: &FrameRegistry) {
        let frames = reg.list_all_frames();
        assert_eq!(frames[0], reg.main_frame_id());
        for (i, id) in frames.iter().enumerate() {
            if let Some(parent) = reg.parent_of(id) {
                let pos = frames.iter().position(|f| f == parent).expect("parent listed");
                assert!(pos < i, "{} listed before its parent {}", id, parent);
            }
        }
    }

    #[test]
    fn test_list_all_frames_is_root_first_depth_first() {
        let reg = sample();
        assert_eq!(reg.list_all_frames(), vec!["main", "a", "a1", "b", "b1"]);
        assert_topological(&reg);
    }

    #[test]
    fn test_ownership_and_inverse_index() {
        let reg = sample();
        assert_eq!(reg.owner_session_id("b"), Some("s-oopif"));
        assert_eq!(reg.owner_session_id("a1"), Some("s-main"));
        assert_eq!(reg.frames_for_session("s-oopif"), vec!["b", "b1"]);
        assert_eq!(reg.sessions(), vec!["s-main", "s-oopif"]);
    }

    #[test]
    fn test_root_swap_preserves_children_and_ownership() {
        let mut reg = sample();
        reg.on_frame_attached("main-2", None, "s-main");

        assert_eq!(reg.main_frame_id(), "main-2");
        assert!(!reg.contains("main"));
        assert_eq!(reg.parent_of("a"), Some("main-2"));
        assert_eq!(reg.parent_of("b"), Some("main-2"));
        assert_eq!(reg.owner_session_id("main-2"), Some("s-main"));
        assert!(reg.frames_for_session("s-main").contains(&"main-2".to_string()));
        assert!(!reg.frames_for_session("s-main").contains(&"main".to_string()));

        let frames = reg.list_all_frames();
        assert_eq!(frames.len(), reg.len());
        let unique: HashSet<_> = frames.iter().collect();
        assert_eq!(unique.len(), frames.len());
        assert_topological(&reg);
    }

    #[test]
    fn test_navigated_root_under_new_id_is_a_swap() {
        let mut reg = sample();
        reg.on_frame_navigated(ProtocolFrame::new("main-3", None).with_url("https://example.com"), "s-main");
        assert_eq!(reg.main_frame_id(), "main-3");
        assert_eq!(reg.children_of("main-3"), &["a".to_string(), "b".to_string()]);
        assert_eq!(reg.last_seen("main-3").unwrap().url, "https://example.com");
    }

    #[test]
    fn test_swap_detach_keeps_frame() {
        let mut reg = sample();
        reg.on_frame_detached("b", DetachReason::from_protocol("swap"));
        assert!(reg.contains("b"));
        assert!(reg.contains("b1"));
    }

    #[test]
    fn test_remove_detach_drops_subtree() {
        let mut reg = sample();
        reg.on_frame_detached("b", DetachReason::Remove);
        assert!(!reg.contains("b"));
        assert!(!reg.contains("b1"));
        assert!(reg.frames_for_session("s-oopif").is_empty());
        assert_eq!(reg.children_of("main"), &["a".to_string()]);
        assert_topological(&reg);
    }

    #[test]
    fn test_applied_events_match_direct_calls() {
        let mut reg = FrameRegistry::new("main", "s-main");
        reg.apply(
            FrameEvent::Attached {
                frame_id: "a".into(),
                parent_id: Some("main".into()),
            },
            "s-main",
        );
        reg.apply(FrameEvent::Navigated(ProtocolFrame::new("main2", None)), "s-main");
        assert_eq!(reg.main_frame_id(), "main2");
        assert_eq!(reg.parent_of("a"), Some("main2"));

        reg.apply(
            FrameEvent::Detached {
                frame_id: "a".into(),
                reason: DetachReason::Swap,
            },
            "s-main",
        );
        assert!(reg.contains("a"));
        reg.apply(
            FrameEvent::Detached {
                frame_id: "a".into(),
                reason: DetachReason::Remove,
            },
            "s-main",
        );
        assert_eq!(reg.list_all_frames(), vec!["main2"]);
    }

    #[test]
    fn test_removing_root_keeps_registry_non_empty() {
        let mut reg = FrameRegistry::new("main", "s-main");
        reg.on_frame_detached("main", DetachReason::Remove);
        assert!(!reg.is_empty());
        assert_eq!(reg.main_frame_id(), "main");
        assert_eq!(reg.owner_session_id("main"), Some("s-main"));
    }

    #[test]
    fn test_seed_and_round_trip_frame_tree() {
        let tree = FrameTree {
            frame: ProtocolFrame::new("root", None).with_url("https://host"),
            child_frames: vec![
                FrameTree {
                    frame: ProtocolFrame::new("c1", Some("root")),
                    child_frames: vec![FrameTree {
                        frame: ProtocolFrame::new("c1a", Some("c1")),
                        child_frames: vec![],
                    }],
                },
                FrameTree {
                    frame: ProtocolFrame::new("c2", Some("root")),
                    child_frames: vec![],
                },
            ],
        };
        let reg = FrameRegistry::from_frame_tree(&tree, "s");
        assert_eq!(reg.list_all_frames(), vec!["root", "c1", "c1a", "c2"]);
        assert_eq!(reg.as_protocol_frame_tree("root"), Some(tree));
    }

    #[test]
    fn test_seeding_with_new_root_id_renames() {
        let mut reg = FrameRegistry::new("old", "s");
        reg.on_frame_attached("child", Some("old"), "s");
        let tree = FrameTree {
            frame: ProtocolFrame::new("new", None),
            child_frames: vec![FrameTree {
                frame: ProtocolFrame::new("child", Some("new")),
                child_frames: vec![],
            }],
        };
        reg.seed_from_frame_tree(&tree, "s");
        assert_eq!(reg.main_frame_id(), "new");
        assert_eq!(reg.list_all_frames(), vec!["new", "child"]);
    }
}
