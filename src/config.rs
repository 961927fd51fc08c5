use crate::Error;
use crate::provisioning::Provisioning;
use crate::table::Capacity;

/// Capacity and worker settings of one copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyConfig {
    read_units: i64,
    write_units: i64,
    read_workers: usize,
    write_workers: usize,
}

impl CopyConfig {
    /// `read_units` is held on the source and `write_units` on the target
    /// while the copy runs; zero keeps the current capacity.
    pub fn new(read_units: i64, write_units: i64, read_workers: usize, write_workers: usize) -> Self {
        Self {
            read_units,
            write_units,
            read_workers,
            write_workers,
        }
    }

    /// Read capacity requested for the source table
    pub fn read_units(&self) -> i64 {
        self.read_units
    }

    /// Write capacity requested for the target table
    pub fn write_units(&self) -> i64 {
        self.write_units
    }

    /// Provisioning to hold during the copy, given the `current` one
    ///
    /// Only the source read and target write capacity are raised, never
    /// lowered. On-demand tables are left alone.
    pub fn provisioning(&self, current: Provisioning) -> Provisioning {
        let source = current.source.map(|capacity| {
            Capacity::new(capacity.read.max(self.read_units), capacity.write)
        });
        let target = current.target.map(|capacity| {
            Capacity::new(capacity.read, capacity.write.max(self.write_units))
        });

        Provisioning { source, target }
    }

    /// Reader and writer task counts
    pub fn workers(&self) -> (usize, usize) {
        (self.read_workers, self.write_workers)
    }

    /// Reject settings the copy could never run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.read_workers == 0 {
            return Err(Error::validation("reader count has to be greater than 0"));
        }
        if self.write_workers == 0 {
            return Err(Error::validation("writer count has to be greater than 0"));
        }
        if u32::try_from(self.read_workers).is_err() {
            return Err(Error::validation(format!(
                "reader count {} is too large",
                self.read_workers
            )));
        }
        if self.read_units < 0 || self.write_units < 0 {
            return Err(Error::validation("capacity units cannot be negative"));
        }
        Ok(())
    }
}
