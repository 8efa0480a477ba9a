use copdo_common::traits::CanSendError;

use crate::pdo::{Rpdo, Tpdo};

/// Holds the PDOs of a node, and runs their process step together
///
/// The table is usually created as a static, alongside the object dictionary.
///
/// ```ignore
/// static PDOS: PdoTable<2, 2> = PdoTable::new(
///     [Rpdo::new(0x200, RestrictionFlags::NONE), Rpdo::new(0x300, RestrictionFlags::NONE)],
///     [Tpdo::new(0x180, RestrictionFlags::NONE), Tpdo::new(0x280, RestrictionFlags::NONE)],
/// );
/// ```
#[allow(missing_debug_implementations)]
pub struct PdoTable<const N_RPDO: usize, const N_TPDO: usize> {
    /// The receive PDOs
    pub rpdos: [Rpdo; N_RPDO],
    /// The transmit PDOs
    pub tpdos: [Tpdo; N_TPDO],
}

impl<const N_RPDO: usize, const N_TPDO: usize> PdoTable<N_RPDO, N_TPDO> {
    /// Create a new table
    pub const fn new(rpdos: [Rpdo; N_RPDO], tpdos: [Tpdo; N_TPDO]) -> Self {
        Self { rpdos, tpdos }
    }

    /// Get the receive PDOs
    pub fn rpdos(&self) -> &[Rpdo] {
        &self.rpdos
    }

    /// Get the transmit PDOs
    pub fn tpdos(&self) -> &[Tpdo] {
        &self.tpdos
    }

    /// Run one process step on every PDO
    ///
    /// RPDOs are processed first, so that a TPDO sent on the same SYNC sees the received values.
    ///
    /// Returns the shortest time in us until a TPDO next needs processing, if any is waiting on a
    /// timer. A send failure does not stop the remaining PDOs from being processed; the first one
    /// is returned once all have run.
    pub fn process(&self, sync_was: bool, elapsed_us: u32) -> Result<Option<u32>, CanSendError> {
        for rpdo in &self.rpdos {
            rpdo.process(sync_was);
        }

        let mut next_wake: Option<u32> = None;
        let mut first_err: Option<CanSendError> = None;
        for tpdo in &self.tpdos {
            match tpdo.process(sync_was, elapsed_us) {
                Ok(Some(wake)) => next_wake = Some(next_wake.map_or(wake, |n| n.min(wake))),
                Ok(None) => (),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(next_wake),
        }
    }
}
