//! Stitching per-frame results into one page-wide view.

use super::FrameSnapshot;
use crate::dom::EncodedId;
use crate::dom::xpath::prefix_xpath;
use crate::error::Result;
use crate::page::Page;
use crate::protocol::{Cdp, Deadline};
use std::collections::{HashMap, HashSet, VecDeque};

/// Where a frame sits in its parent document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlacement {
    /// Absolute XPath of the hosting `<iframe>`; empty for the main frame
    pub absolute_prefix: String,
    /// Encoded id of the hosting `<iframe>` in the parent frame
    pub host: Option<EncodedId>,
}

/// Breadth-first from the main frame, find each frame's host element and
/// absolute prefix. Frames whose owner cannot be resolved inherit the
/// parent's prefix and have no host.
pub fn compute_frame_placements(
    page: &Page,
    frames: &HashMap<String, FrameSnapshot>,
    deadline: &Deadline,
) -> Result<HashMap<String, FramePlacement>> {
    let root = page.main_frame_id().to_string();
    let mut placements: HashMap<String, FramePlacement> = HashMap::new();
    placements.insert(root.clone(), FramePlacement::default());

    let mut queue: VecDeque<String> = VecDeque::from([root]);
    while let Some(parent) = queue.pop_front() {
        let parent_prefix = placements
            .get(&parent)
            .map(|p| p.absolute_prefix.clone())
            .unwrap_or_default();
        let cdp = Cdp::new(page.session_for_frame(&parent), deadline);

        for child in page.registry().children_of(&parent) {
            if placements.contains_key(child) {
                continue;
            }
            let owner = match cdp.get_frame_owner(child) {
                Ok(owner) => owner,
                Err(e) if e.is_timeout() => return Err(e),
                Err(e) => {
                    log::debug!("Owner of frame {} not resolvable: {}", child, e);
                    None
                }
            };

            let host = owner.map(|backend| page.encode(&parent, backend));
            let local = host
                .as_ref()
                .and_then(|id| frames.get(&parent).and_then(|f| f.xpath_map.get(id)));
            let placement = match local {
                Some(local) => FramePlacement {
                    absolute_prefix: prefix_xpath(&parent_prefix, local),
                    host,
                },
                None => FramePlacement {
                    absolute_prefix: parent_prefix.clone(),
                    host,
                },
            };
            placements.insert(child.clone(), placement);
            queue.push_back(child.clone());
        }
    }
    Ok(placements)
}

/// Encoded id inside the leading `[...]` of an outline line
fn line_label(line: &str) -> Option<EncodedId> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    rest[..end].parse().ok()
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Insert each child frame's outline under the line of its host iframe,
/// re-indented one level deeper. Nested frames are expanded with an explicit
/// stack; each outline is injected at most once.
pub fn inject_subtrees(root_outline: &str, subtrees: &HashMap<EncodedId, String>) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut injected: HashSet<EncodedId> = HashSet::new();
    // (outline lines, next line index, extra indent)
    let mut stack: Vec<(Vec<&str>, usize, usize)> = vec![(root_outline.lines().collect(), 0, 0)];

    while let Some((lines, index, extra)) = stack.pop() {
        let Some(line) = lines.get(index).copied() else { continue };
        out.push(format!("{}{}", " ".repeat(extra), line));
        stack.push((lines, index + 1, extra));

        let Some(id) = line_label(line) else { continue };
        let Some(child) = subtrees.get(&id) else { continue };
        if !injected.insert(id) {
            continue;
        }
        let child_indent = extra + indent_of(line) + 2;
        stack.push((child.lines().collect(), 0, child_indent));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_label() {
        assert_eq!(line_label("    [1-42] button: Go"), Some(EncodedId::new(1, 42)));
        assert_eq!(line_label("[ax-7] generic"), None);
        assert_eq!(line_label("no label"), None);
    }

    #[test]
    fn test_injects_nested_frames() {
        let root = "[0-1] RootWebArea\n  [0-4] Iframe\n  [0-5] link: After";
        let mut subtrees = HashMap::new();
        subtrees.insert(EncodedId::new(0, 4), "[1-10] RootWebArea\n  [1-12] Iframe".to_string());
        subtrees.insert(EncodedId::new(1, 12), "[2-20] button: Deep".to_string());

        let merged = inject_subtrees(root, &subtrees);
        assert_eq!(
            merged,
            "[0-1] RootWebArea\n  [0-4] Iframe\n    [1-10] RootWebArea\n      [1-12] Iframe\n        [2-20] button: Deep\n  [0-5] link: After"
        );
    }

    #[test]
    fn test_self_referencing_outline_terminates() {
        let root = "[0-4] Iframe";
        let mut subtrees = HashMap::new();
        subtrees.insert(EncodedId::new(0, 4), "[0-4] Iframe".to_string());

        let merged = inject_subtrees(root, &subtrees);
        assert_eq!(merged, "[0-4] Iframe\n  [0-4] Iframe");
    }
}
