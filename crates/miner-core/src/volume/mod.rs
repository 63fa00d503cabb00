//! The volume backend abstraction (§6 "External interfaces"): reports
//! mount/unmount activity and classifies paths as living on a removable
//! device or not, without the core needing to know how that's detected on
//! any particular platform.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::model::Device;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeEvent {
    Mounted(Device),
    Unmounted(Device),
}

/// Abstracts over the OS mount-point subsystem.
pub trait VolumeBackend: Send + Sync {
    /// Takes ownership of the mount/unmount notification stream. Called
    /// once by the Processor at construction time.
    fn take_events(&mut self) -> UnboundedReceiver<VolumeEvent>;

    /// Currently mounted roots, split into removable and non-removable.
    fn current_mounts(&self) -> (Vec<Device>, Vec<Device>);

    /// Resolves the device a path lives under, if any.
    fn device_for_path(&self, path: &Path) -> Option<Device>;
}

/// A fully scripted [`VolumeBackend`] for tests: mounts/unmounts are
/// injected directly rather than observed from the OS.
pub struct StaticVolumeBackend {
    events_tx: UnboundedSender<VolumeEvent>,
    events_rx: Option<UnboundedReceiver<VolumeEvent>>,
    mounts: Vec<Device>,
}

impl StaticVolumeBackend {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx: Some(events_rx),
            mounts: Vec::new(),
        }
    }

    pub fn mount(&mut self, device: Device) {
        self.mounts.retain(|d| d.udi != device.udi);
        self.mounts.push(device.clone());
        let _ = self.events_tx.send(VolumeEvent::Mounted(device));
    }

    pub fn unmount(&mut self, udi: &str) {
        if let Some(index) = self.mounts.iter().position(|d| d.udi == udi) {
            let mut device = self.mounts.remove(index);
            device.mounted = false;
            let _ = self.events_tx.send(VolumeEvent::Unmounted(device));
        }
    }
}

impl Default for StaticVolumeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeBackend for StaticVolumeBackend {
    fn take_events(&mut self) -> UnboundedReceiver<VolumeEvent> {
        self.events_rx.take().expect("take_events called twice")
    }

    fn current_mounts(&self) -> (Vec<Device>, Vec<Device>) {
        // The static backend treats every mounted device as removable;
        // tests that need a non-removable mount construct one directly via
        // `mount()` and ignore this split.
        (self.mounts.clone(), Vec::new())
    }

    fn device_for_path(&self, path: &Path) -> Option<Device> {
        self.mounts
            .iter()
            .filter(|device| path.starts_with(&device.mount_point))
            .max_by_key(|device| device.mount_point.as_os_str().len())
            .cloned()
    }
}

/// A [`VolumeBackend`] that reports a fixed, never-changing set of
/// non-removable mounts — the default when removable-device indexing is
/// disabled entirely.
pub struct StaticNonRemovableBackend {
    mounts: Vec<Device>,
}

impl StaticNonRemovableBackend {
    pub fn new(mounts: Vec<Device>) -> Self {
        Self { mounts }
    }
}

impl VolumeBackend for StaticNonRemovableBackend {
    fn take_events(&mut self) -> UnboundedReceiver<VolumeEvent> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }

    fn current_mounts(&self) -> (Vec<Device>, Vec<Device>) {
        (Vec::new(), self.mounts.clone())
    }

    fn device_for_path(&self, path: &Path) -> Option<Device> {
        self.mounts
            .iter()
            .find(|device| path.starts_with(&device.mount_point))
            .cloned()
    }
}
