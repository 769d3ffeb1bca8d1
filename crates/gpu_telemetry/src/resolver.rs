//! Resolução de dispositivos: índice, UUID ou bus id PCI → [`DeviceHandle`].
//!
//! Sem cache: cada resolução vai até a binding.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::library::TelemetryLibrary;
use crate::status::{BindingResult, StatusCode};
use crate::types::DeviceHandle;

/// Chave usada para localizar uma GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Index(u32),
    Uuid(String),
    PciBusId(String),
}

impl FromStr for DeviceSelector {
    type Err = String;

    /// `"0"` → índice, `"GPU-…"`/`"MIG-…"` → UUID, `"0000:01:00.0"` → bus id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("seletor de GPU vazio".into());
        }
        if let Ok(index) = s.parse::<u32>() {
            return Ok(DeviceSelector::Index(index));
        }
        let upper = s.to_ascii_uppercase();
        if upper.starts_with("GPU-") || upper.starts_with("MIG-") {
            return Ok(DeviceSelector::Uuid(s.to_string()));
        }
        if s.contains(':') {
            return Ok(DeviceSelector::PciBusId(s.to_string()));
        }
        Err(format!("seletor de GPU inválido: {s:?}"))
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(i) => write!(f, "#{i}"),
            DeviceSelector::Uuid(uuid) => f.write_str(uuid),
            DeviceSelector::PciBusId(bus_id) => f.write_str(bus_id),
        }
    }
}

/// Resolve handles sobre a biblioteca compartilhada.
#[derive(Clone)]
pub struct DeviceResolver {
    library: Arc<TelemetryLibrary>,
}

impl DeviceResolver {
    pub fn new(library: Arc<TelemetryLibrary>) -> Self {
        Self { library }
    }

    fn ensure_available(&self) -> BindingResult<()> {
        if self.library.is_available() {
            Ok(())
        } else {
            Err(StatusCode::Uninitialized)
        }
    }

    /// Resolve pelo índice de enumeração. `NotFound` se `index >= device_count`.
    pub fn resolve_by_index(&self, index: u32) -> BindingResult<DeviceHandle> {
        self.ensure_available()?;
        let count = self.library.binding().device_count()?;
        if index >= count {
            return Err(StatusCode::NotFound);
        }
        self.library.binding().device_by_index(index)
    }

    pub fn resolve_by_uuid(&self, uuid: &str) -> BindingResult<DeviceHandle> {
        self.ensure_available()?;
        self.library.binding().device_by_uuid(uuid)
    }

    pub fn resolve_by_pci_bus_id(&self, bus_id: &str) -> BindingResult<DeviceHandle> {
        self.ensure_available()?;
        self.library.binding().device_by_pci_bus_id(bus_id)
    }

    pub fn resolve(&self, selector: &DeviceSelector) -> BindingResult<DeviceHandle> {
        match selector {
            DeviceSelector::Index(i) => self.resolve_by_index(*i),
            DeviceSelector::Uuid(uuid) => self.resolve_by_uuid(uuid),
            DeviceSelector::PciBusId(bus_id) => self.resolve_by_pci_bus_id(bus_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, FakeBinding};
    use crate::library::LibrarySearch;

    fn resolver(devices: u32) -> (Arc<FakeBinding>, DeviceResolver) {
        let fake = Arc::new(FakeBinding::with_devices(devices));
        let lib = Arc::new(TelemetryLibrary::new(fake.clone(), LibrarySearch::SystemDefault));
        lib.ensure_initialized();
        (fake, DeviceResolver::new(lib))
    }

    #[test]
    fn resolves_existing_index() {
        let (_, r) = resolver(2);
        assert_eq!(r.resolve_by_index(1), Ok(DeviceHandle::new(1)));
    }

    #[test]
    fn index_past_count_is_not_found() {
        let (_, r) = resolver(2);
        assert_eq!(r.resolve_by_index(2), Err(StatusCode::NotFound));
    }

    #[test]
    fn unavailable_library_is_uninitialized() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = Arc::new(TelemetryLibrary::new(fake, LibrarySearch::SystemDefault));
        let r = DeviceResolver::new(lib);
        assert_eq!(r.resolve_by_index(0), Err(StatusCode::Uninitialized));
        assert_eq!(r.resolve_by_uuid("GPU-x"), Err(StatusCode::Uninitialized));
    }

    #[test]
    fn enumeration_failure_is_propagated() {
        let (fake, r) = resolver(1);
        fake.fail(Call::DeviceCount, StatusCode::Timeout);
        assert_eq!(r.resolve_by_index(0), Err(StatusCode::Timeout));
    }

    #[test]
    fn resolves_by_uuid_and_bus_id() {
        let (_, r) = resolver(2);
        let uuid = "GPU-00000001-1111-2222-3333-444444444444";
        assert_eq!(r.resolve_by_uuid(uuid), Ok(DeviceHandle::new(1)));
        assert_eq!(r.resolve_by_pci_bus_id("00000000:01:00.0"), Ok(DeviceHandle::new(0)));
        assert_eq!(r.resolve_by_uuid("GPU-nope"), Err(StatusCode::NotFound));
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("3".parse(), Ok(DeviceSelector::Index(3)));
        assert_eq!(
            "GPU-abc".parse(),
            Ok(DeviceSelector::Uuid("GPU-abc".into()))
        );
        assert_eq!(
            "00000000:65:00.0".parse(),
            Ok(DeviceSelector::PciBusId("00000000:65:00.0".into()))
        );
        assert!("".parse::<DeviceSelector>().is_err());
        assert!("placa".parse::<DeviceSelector>().is_err());
    }

    #[test]
    fn selector_dispatch() {
        let (_, r) = resolver(2);
        assert_eq!(r.resolve(&DeviceSelector::Index(0)), Ok(DeviceHandle::new(0)));
        assert_eq!(
            r.resolve(&DeviceSelector::PciBusId("00000000:02:00.0".into())),
            Ok(DeviceHandle::new(1))
        );
    }
}
