//! Lazily refreshed mirror of device registers.

use log::{debug, trace};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::PixxError;
use crate::register::{Register, RegisterMap, RegisterSnapshot, RegisterValue};
use crate::transport::DeviceTransport;

/// A register cache shared by the components of one device session.
pub type SharedCache<T> = Rc<RefCell<RegisterCache<T>>>;

/// Cached mirror of the registers listed in a [`RegisterMap`].
///
/// [`refresh`](Self::refresh) reads the whole table in one batch. Reads are served
/// from that snapshot until a [`set`](Self::set) writes to the device, after which
/// the next read refreshes first so hardware-side side effects become visible.
pub struct RegisterCache<T: DeviceTransport> {
    transport: T,
    map: RegisterMap,
    values: HashMap<Register, RegisterValue>,
    stale: bool,
}

impl<T: DeviceTransport> RegisterCache<T> {
    /// Create an empty cache. Nothing is read until the first access.
    pub fn new(transport: T, map: RegisterMap) -> Self {
        Self {
            transport,
            map,
            values: HashMap::new(),
            stale: true,
        }
    }

    /// Wrap the cache for sharing between a display and a response box.
    pub fn into_shared(self) -> SharedCache<T> {
        Rc::new(RefCell::new(self))
    }

    /// Re-read every mapped register.
    ///
    /// The snapshot is replaced only when all reads succeed; on failure the
    /// previous snapshot stays in place and the error is returned.
    pub fn refresh(&mut self) -> Result<(), PixxError> {
        let mut values = HashMap::with_capacity(self.map.len());
        for entry in self.map.iter() {
            let value = self.transport.read_register(entry.register)?;
            values.insert(entry.register, value);
        }
        self.values = values;
        self.stale = false;
        trace!("register cache refreshed ({} registers)", self.values.len());
        Ok(())
    }

    /// Read a register from the snapshot, refreshing first if the cache is stale.
    pub fn get(&mut self, register: Register) -> Result<RegisterValue, PixxError> {
        if self.map.entry(register).is_none() {
            return Err(PixxError::UnmappedRegister(register));
        }
        if self.stale {
            self.refresh()?;
        }
        self.values
            .get(&register)
            .cloned()
            .ok_or(PixxError::UnmappedRegister(register))
    }

    /// Write a register unless it already holds `value`.
    ///
    /// Returns whether a hardware write was issued.
    pub fn set(
        &mut self,
        register: Register,
        value: impl Into<RegisterValue>,
    ) -> Result<bool, PixxError> {
        self.map.check_writable(register)?;
        let value = value.into();
        if self.get(register)? == value {
            trace!("skipping write of {}={} (unchanged)", register, value);
            return Ok(false);
        }
        self.transport.write_register(register, &value)?;
        self.stale = true;
        debug!("wrote {}={}", register, value);
        Ok(true)
    }

    /// Read a boolean register.
    pub fn get_bool(&mut self, register: Register) -> Result<bool, PixxError> {
        self.get_as(register, RegisterValue::as_bool)
    }

    /// Read an integer register.
    pub fn get_int(&mut self, register: Register) -> Result<i64, PixxError> {
        self.get_as(register, RegisterValue::as_int)
    }

    /// Read a numeric register as a float.
    pub fn get_float(&mut self, register: Register) -> Result<f64, PixxError> {
        self.get_as(register, RegisterValue::as_float)
    }

    fn get_as<V>(
        &mut self,
        register: Register,
        convert: impl FnOnce(&RegisterValue) -> Option<V>,
    ) -> Result<V, PixxError> {
        let value = self.get(register)?;
        convert(&value).ok_or(PixxError::UnexpectedRegisterValue { register, value })
    }

    /// Capture the registers the map flags as calibration state.
    pub fn snapshot(&mut self) -> Result<RegisterSnapshot, PixxError> {
        if self.stale {
            self.refresh()?;
        }
        Ok(self
            .map
            .iter()
            .filter(|e| e.calibrated)
            .filter_map(|e| self.values.get(&e.register).map(|v| (e.register, v.clone())))
            .collect())
    }

    /// Force the next read to refresh.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Whether the next read will refresh.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The register table this cache mirrors.
    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, for log access and device time.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use crate::register::Access;

    fn cache() -> (MockDevice, RegisterCache<MockDevice>) {
        let device = MockDevice::new();
        let cache = RegisterCache::new(device.clone(), RegisterMap::viewpixx());
        (device, cache)
    }

    #[test]
    fn test_first_get_refreshes_whole_table() {
        let (device, mut cache) = cache();
        assert!(cache.is_stale());

        assert_eq!(cache.get_int(Register::BacklightIntensity).unwrap(), 255);
        assert_eq!(device.read_count(), Register::ALL.len());

        // Served from the snapshot.
        cache.get(Register::VideoMode).unwrap();
        assert_eq!(device.read_count(), Register::ALL.len());
    }

    #[test]
    fn test_snapshot_is_stable_within_a_step() {
        let (device, mut cache) = cache();
        cache.refresh().unwrap();

        device.set_register(Register::BacklightIntensity, 10i64);
        assert_eq!(cache.get_int(Register::BacklightIntensity).unwrap(), 255);

        cache.refresh().unwrap();
        assert_eq!(cache.get_int(Register::BacklightIntensity).unwrap(), 10);
    }

    #[test]
    fn test_set_skips_redundant_write() {
        let (device, mut cache) = cache();
        assert!(!cache.set(Register::BacklightIntensity, 255i64).unwrap());
        assert_eq!(device.write_count(), 0);
        assert!(!cache.is_stale());

        assert!(cache.set(Register::BacklightIntensity, 128i64).unwrap());
        assert_eq!(device.write_count(), 1);
        assert!(cache.is_stale());
        assert_eq!(cache.get_int(Register::BacklightIntensity).unwrap(), 128);
    }

    #[test]
    fn test_set_rejects_read_only_and_unmapped() {
        let device = MockDevice::new();
        let map = RegisterMap::empty().with(Register::DinValue, Access::ReadOnly, false);
        let mut cache = RegisterCache::new(device.clone(), map);

        assert!(matches!(
            cache.set(Register::DinValue, 0i64),
            Err(PixxError::ReadOnlyRegister(Register::DinValue))
        ));
        assert!(matches!(
            cache.set(Register::VideoMode, "M16"),
            Err(PixxError::UnmappedRegister(Register::VideoMode))
        ));
        assert!(matches!(
            cache.get(Register::VideoMode),
            Err(PixxError::UnmappedRegister(Register::VideoMode))
        ));
        assert_eq!(device.write_count(), 0);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let (device, mut cache) = cache();
        cache.refresh().unwrap();

        device.set_register(Register::BacklightIntensity, 1i64);
        device.fail_after_reads(2);
        assert!(matches!(cache.refresh(), Err(PixxError::DeviceIo(_))));

        device.fail_after_reads(usize::MAX);
        assert_eq!(cache.get_int(Register::BacklightIntensity).unwrap(), 255);
    }

    #[test]
    fn test_snapshot_contains_only_calibrated_registers() {
        let (_device, mut cache) = cache();
        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.get(Register::VideoMode), Some(&RegisterValue::from("C24")));
        assert!(snapshot.get(Register::DinValue).is_none());
        assert_eq!(snapshot.iter().count(), 5);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let (_device, mut cache) = cache();
        assert!(matches!(
            cache.get_bool(Register::VideoMode),
            Err(PixxError::UnexpectedRegisterValue {
                register: Register::VideoMode,
                ..
            })
        ));
    }
}
