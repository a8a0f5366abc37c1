//! Screen groups: mirror / expand composites of screens.
//!
//! A group is a list of member screens, each with the offset at which it sits
//! inside the group.  In `Mirror` mode every member sits at the origin (they
//! show the same content); in `Expand` mode members are stacked horizontally
//! left to right.  A screen belongs to at most one group; the registry
//! dissolves a group as soon as its last member leaves.

use serde::{Deserialize, Serialize};

use super::geometry::Point;
use super::screen_identity::ScreenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinationMode {
    Mirror,
    Expand,
}

/// A member screen and its offset inside the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupChild {
    pub screen_id: ScreenId,
    pub offset: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenGroupEntity {
    pub id: ScreenId,
    pub combination: CombinationMode,
    children: Vec<GroupChild>,
}

impl ScreenGroupEntity {
    pub fn new(id: ScreenId, combination: CombinationMode) -> Self {
        Self {
            id,
            combination,
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[GroupChild] {
        &self.children
    }

    pub fn contains(&self, screen_id: ScreenId) -> bool {
        self.children.iter().any(|c| c.screen_id == screen_id)
    }

    /// Offset for the next member to join.  `width_of` returns a member's
    /// current width in pixels.
    pub fn next_child_offset(&self, width_of: impl Fn(ScreenId) -> u32) -> Point {
        match self.combination {
            CombinationMode::Mirror => Point::ORIGIN,
            CombinationMode::Expand => {
                let x: u32 = self.children.iter().map(|c| width_of(c.screen_id)).sum();
                Point::new(x as i32, 0)
            }
        }
    }

    /// Adds a member.  Returns `false` if it is already a member.
    pub fn add_child(&mut self, screen_id: ScreenId, offset: Point) -> bool {
        if self.contains(screen_id) {
            return false;
        }
        self.children.push(GroupChild { screen_id, offset });
        true
    }

    pub fn remove_child(&mut self, screen_id: ScreenId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c.screen_id != screen_id);
        self.children.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_members_sit_at_origin() {
        let mut group = ScreenGroupEntity::new(ScreenId(9), CombinationMode::Mirror);
        group.add_child(ScreenId(0), Point::ORIGIN);
        assert_eq!(group.next_child_offset(|_| 1920), Point::ORIGIN);
    }

    #[test]
    fn test_expand_members_stack_horizontally() {
        // Arrange
        let mut group = ScreenGroupEntity::new(ScreenId(9), CombinationMode::Expand);
        let width_of = |id: ScreenId| if id == ScreenId(0) { 1080 } else { 1920 };

        // Act
        let first = group.next_child_offset(width_of);
        group.add_child(ScreenId(0), first);
        let second = group.next_child_offset(width_of);
        group.add_child(ScreenId(1), second);
        let third = group.next_child_offset(width_of);

        // Assert
        assert_eq!(first, Point::new(0, 0));
        assert_eq!(second, Point::new(1080, 0));
        assert_eq!(third, Point::new(3000, 0));
    }

    #[test]
    fn test_add_child_is_idempotent() {
        let mut group = ScreenGroupEntity::new(ScreenId(9), CombinationMode::Mirror);
        assert!(group.add_child(ScreenId(1), Point::ORIGIN));
        assert!(!group.add_child(ScreenId(1), Point::new(5, 5)));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_removing_last_child_leaves_group_empty() {
        let mut group = ScreenGroupEntity::new(ScreenId(9), CombinationMode::Mirror);
        group.add_child(ScreenId(1), Point::ORIGIN);
        assert!(group.remove_child(ScreenId(1)));
        assert!(!group.remove_child(ScreenId(1)));
        assert!(group.is_empty());
    }
}
