//! Sibling position allocation
//!
//! Positions are plain integers spaced `interval` apart. Inserting between
//! two siblings takes the floor midpoint; when the gap is exhausted only the
//! siblings after the insertion point are renumbered.

use crate::db::Sibling;
use crate::models::Placement;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Anchor {0} is not a sibling")]
    AnchorNotSibling(String),

    #[error("Position out of range next to {0}")]
    Overflow(i64),
}

/// Result of an allocation: the new position, plus siblings that had to move
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    pub position: i64,
    /// `(sibling id, new position)`, in sibling order
    pub renumbered: Vec<(String, i64)>,
}

impl Allocation {
    fn at(position: i64) -> Self {
        Self {
            position,
            renumbered: Vec::new(),
        }
    }
}

/// Computes positions for new or moved children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionAllocator {
    interval: i64,
}

impl Default for PositionAllocator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_POSITION_INTERVAL)
    }
}

impl PositionAllocator {
    pub fn new(interval: i64) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Position for `placement` among `siblings`
    pub fn allocate(
        &self,
        siblings: &[Sibling],
        placement: &Placement,
    ) -> Result<Allocation, AllocationError> {
        match placement {
            Placement::Append => Ok(Allocation::at(self.append(siblings)?)),
            Placement::At(position) => Ok(Allocation::at(*position)),
            Placement::After(id) => {
                let anchor = Self::find(siblings, id)?;
                self.insert_after(siblings, anchor)
            }
            Placement::Before(id) => {
                let anchor = Self::find(siblings, id)?;
                self.insert_before(siblings, anchor)
            }
        }
    }

    fn find<'s>(siblings: &'s [Sibling], id: &str) -> Result<&'s Sibling, AllocationError> {
        siblings
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AllocationError::AnchorNotSibling(id.to_string()))
    }

    /// 0 for the first child, else one interval past the largest position
    pub fn append(&self, siblings: &[Sibling]) -> Result<i64, AllocationError> {
        match siblings.iter().map(|s| s.position).max() {
            Some(max) => self.step(max, 1),
            None => Ok(0),
        }
    }

    /// Directly after `anchor`
    pub fn insert_after(
        &self,
        siblings: &[Sibling],
        anchor: &Sibling,
    ) -> Result<Allocation, AllocationError> {
        let successors = Self::sorted(siblings.iter().filter(|s| s.position > anchor.position));

        let Some(next) = successors.first() else {
            return Ok(Allocation::at(self.step(anchor.position, 1)?));
        };

        let midpoint = Self::midpoint(anchor.position, next.position);
        if midpoint != anchor.position {
            return Ok(Allocation::at(midpoint));
        }

        let position = self.step(anchor.position, 1)?;
        Ok(Allocation {
            position,
            renumbered: self.renumber_from(position, &successors)?,
        })
    }

    /// Directly before `anchor`
    pub fn insert_before(
        &self,
        siblings: &[Sibling],
        anchor: &Sibling,
    ) -> Result<Allocation, AllocationError> {
        let predecessor = siblings
            .iter()
            .filter(|s| s.position < anchor.position)
            .map(|s| s.position)
            .max();

        let Some(previous) = predecessor else {
            return Ok(Allocation::at(self.step(anchor.position, -1)?));
        };

        let midpoint = Self::midpoint(anchor.position, previous);
        if midpoint != previous {
            return Ok(Allocation::at(midpoint));
        }

        // No room: take the anchor's place and push it and everything after it along
        let position = anchor.position;
        let rest = Self::sorted(siblings.iter().filter(|s| s.position >= anchor.position));
        Ok(Allocation {
            position,
            renumbered: self.renumber_from(position, &rest)?,
        })
    }

    // Floor of the mean; always fits in i64
    fn midpoint(a: i64, b: i64) -> i64 {
        (i128::from(a) + i128::from(b)).div_euclid(2) as i64
    }

    /// `position + steps * interval`, or `Overflow`
    fn step(&self, position: i64, steps: i64) -> Result<i64, AllocationError> {
        steps
            .checked_mul(self.interval)
            .and_then(|offset| position.checked_add(offset))
            .ok_or(AllocationError::Overflow(position))
    }

    // Stable, so equal positions keep their storage order
    fn sorted<'s>(siblings: impl Iterator<Item = &'s Sibling>) -> Vec<&'s Sibling> {
        let mut sorted: Vec<&Sibling> = siblings.collect();
        sorted.sort_by_key(|s| s.position);
        sorted
    }

    fn renumber_from(
        &self,
        position: i64,
        siblings: &[&Sibling],
    ) -> Result<Vec<(String, i64)>, AllocationError> {
        siblings
            .iter()
            .enumerate()
            .map(|(i, s)| {
                self.step(position, i as i64 + 1)
                    .map(|p| (s.id.clone(), p))
            })
            .collect()
    }
}
