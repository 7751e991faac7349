//! The pool of ports instances may bind.

use std::collections::BTreeSet;

use crate::InstanceError;

/// An inclusive port range and the ports currently handed out.
#[derive(Debug, Clone)]
pub struct PortPool {
    min: u16,
    max: u16,
    in_use: BTreeSet<u16>,
}

impl PortPool {
    /// # Errors
    /// [`InstanceError::InvalidPortRange`] if `min > max`.
    pub fn new(min: u16, max: u16) -> Result<Self, InstanceError> {
        if min > max {
            return Err(InstanceError::InvalidPortRange { min, max });
        }
        Ok(Self {
            min,
            max,
            in_use: BTreeSet::new(),
        })
    }

    /// Claims and returns the lowest free port, or `None` if every port
    /// in the range is taken.
    pub fn allocate(&mut self) -> Option<u16> {
        let port = (self.min..=self.max).find(|port| !self.in_use.contains(port))?;
        self.in_use.insert(port);
        Some(port)
    }

    /// Returns `port` to the pool. Returns `false` if it was not claimed.
    pub fn release(&mut self, port: u16) -> bool {
        self.in_use.remove(&port)
    }

    /// Returns `true` if `port` lies inside the configured range.
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.in_use.contains(&port)
    }

    pub fn range(&self) -> (u16, u16) {
        (self.min, self.max)
    }

    pub fn capacity(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}
