use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Error;

/// An update waiting for the expiration to reach its time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PendingUpdate {
    pub time: f64,
    pub value: DVector<f64>,
    pub expiration: f64,
}

/// Updates received ahead of the current expiration, sorted by time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct UpdateBacklog {
    pending: Vec<PendingUpdate>,
}

impl UpdateBacklog {
    /// Routes an update to `apply` or to the backlog.
    ///
    /// `apply` performs an update that takes effect exactly at the current
    /// expiration and returns the new expiration. After each applied update,
    /// any buffered update that now takes effect at the new expiration is
    /// replayed, and buffered updates the new expiration has already passed
    /// are discarded.
    pub(crate) fn process(
        &mut self,
        current_expiration: f64,
        update: PendingUpdate,
        mut apply: impl FnMut(PendingUpdate) -> Result<f64, Error>,
    ) -> Result<(), Error> {
        if update.expiration < update.time {
            return Err(Error::InvalidExpiration {
                time: update.time,
                expiration: update.expiration,
            });
        }
        if update.time < current_expiration {
            return Err(Error::UpdateBeforeExpiration {
                time: update.time,
                expiration: current_expiration,
            });
        }
        if update.time > current_expiration {
            self.insert(update, current_expiration);
            return Ok(());
        }

        let mut expiration = apply(update)?;
        while let Some(next) = self.take_ready(expiration) {
            debug!(
                time = next.time,
                expiration = next.expiration,
                "replaying buffered update"
            );
            expiration = apply(next)?;
        }
        Ok(())
    }

    #[allow(clippy::float_cmp)]
    fn insert(&mut self, update: PendingUpdate, current_expiration: f64) {
        let idx = self.pending.partition_point(|p| p.time < update.time);
        if self.pending.get(idx).is_some_and(|p| p.time == update.time) {
            warn!(
                time = update.time,
                "replacing buffered update with a newer one at the same time"
            );
            self.pending[idx] = update;
        } else {
            debug!(
                time = update.time,
                current_expiration, "buffering update received before its time"
            );
            self.pending.insert(idx, update);
        }
    }

    #[allow(clippy::float_cmp)]
    fn take_ready(&mut self, expiration: f64) -> Option<PendingUpdate> {
        let superseded = self.pending.partition_point(|p| p.time < expiration);
        for dropped in self.pending.drain(..superseded) {
            warn!(
                time = dropped.time,
                expiration, "discarding buffered update superseded by an earlier one"
            );
        }
        match self.pending.first() {
            Some(next) if next.time == expiration => Some(self.pending.remove(0)),
            _ => None,
        }
    }

    /// Checks decoded entries against the owning function's component count.
    pub(crate) fn validate(&self, dimension: usize, kind: &'static str) -> Result<(), Error> {
        let sorted = self.pending.windows(2).all(|w| w[0].time < w[1].time);
        if !sorted {
            return Err(Error::Malformed {
                kind,
                reason: "buffered updates are not in time order".to_string(),
            });
        }
        if let Some(bad) = self.pending.iter().find(|p| p.value.len() != dimension) {
            return Err(Error::Malformed {
                kind,
                reason: format!(
                    "buffered update at time {} has {} components, expected {dimension}",
                    bad.time,
                    bad.value.len()
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
