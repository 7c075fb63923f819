// ── Device registry ──
//
// ID-keyed lookup through a single owning map. Devices hold no
// back-pointers to the bridge; anything that needs a sibling queries
// the registry by ID.

use dashmap::DashMap;

use crate::device::Device;

#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<i64, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device: Device) {
        self.devices.insert(device.id(), device);
    }

    pub fn get(&self, id: i64) -> Option<Device> {
        self.devices.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: i64) -> Option<Device> {
        self.devices.remove(&id).map(|(_, device)| device)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.devices.iter().map(|entry| *entry.key()).collect()
    }

    /// All devices, sorted by ID for stable display.
    pub fn all(&self) -> Vec<Device> {
        let mut out: Vec<Device> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(Device::id);
        out
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
