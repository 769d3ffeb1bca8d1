//! NVIDIA GPU via NVML (nvidia-ml).
//!
//! Carrega `nvml.dll` / `libnvidia-ml.so` dinamicamente na inicialização:
//! funciona com qualquer driver NVIDIA. Sem driver, `init()` falha com status
//! e o núcleo segue desativado.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use nvml_wrapper::Device;
use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::error::NvmlError;
use tracing::debug;

use crate::binding::GpuBinding;
use crate::status::{BindingResult, StatusCode};
use crate::types::{
    ClockDomain, DeviceHandle, EngineUtilization, MemoryInfo, PciInfo, TextField, Utilization,
};

/// Binding real sobre `nvml-wrapper`.
pub struct NvmlBinding {
    /// Caminho explícito da biblioteca (vazio = nome padrão da plataforma)
    library_path: Option<PathBuf>,
    session: RwLock<Option<Session>>,
}

/// NVML viva e os dispositivos resolvidos nela.
struct Session {
    nvml: Nvml,
    devices: DeviceTable,
}

/// Handles brutos (`nvmlDevice_t`) resolvidos na sessão atual.
///
/// Um [`DeviceHandle`] é a posição nesta tabela. O handle bruto pertence a uma
/// GPU física e vale até o shutdown, então uma mudança na enumeração nunca
/// redireciona o adaptador para outra placa.
#[derive(Default)]
struct DeviceTable {
    raw: Mutex<Vec<usize>>,
}

impl DeviceTable {
    fn lock(&self) -> MutexGuard<'_, Vec<usize>> {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra o handle bruto (uma vez por GPU) e devolve o token.
    fn intern(&self, raw: usize) -> DeviceHandle {
        let mut table = self.lock();
        let slot = match table.iter().position(|&r| r == raw) {
            Some(slot) => slot,
            None => {
                table.push(raw);
                table.len() - 1
            }
        };
        DeviceHandle::new(slot as u32)
    }

    fn get(&self, handle: DeviceHandle) -> Option<usize> {
        self.lock().get(handle.raw() as usize).copied()
    }
}

impl NvmlBinding {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self {
            library_path,
            session: RwLock::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Executa `query` com a instância NVML viva.
    fn with_nvml<T>(&self, query: impl FnOnce(&Nvml) -> Result<T, NvmlError>) -> BindingResult<T> {
        let guard = self.read();
        let session = guard.as_ref().ok_or(StatusCode::Uninitialized)?;
        Ok(query(&session.nvml)?)
    }

    /// Resolve um dispositivo e guarda o handle bruto na sessão.
    fn register(
        &self,
        resolve: impl FnOnce(&Nvml) -> Result<Device<'_>, NvmlError>,
    ) -> BindingResult<DeviceHandle> {
        let guard = self.read();
        let session = guard.as_ref().ok_or(StatusCode::Uninitialized)?;
        let device = resolve(&session.nvml)?;
        let raw = unsafe { device.handle() } as usize;
        Ok(session.devices.intern(raw))
    }

    /// Executa `query` no dispositivo apontado pelo handle.
    fn with_device<T>(
        &self,
        handle: DeviceHandle,
        query: impl FnOnce(&Device<'_>) -> Result<T, NvmlError>,
    ) -> BindingResult<T> {
        let guard = self.read();
        let session = guard.as_ref().ok_or(StatusCode::Uninitialized)?;
        let raw = session
            .devices
            .get(handle)
            .ok_or(StatusCode::InvalidArgument)?;
        // `raw` veio de `Device::handle` nesta sessão; o shutdown precisa do
        // lock de escrita, então a NVML continua viva durante a consulta.
        let device = unsafe { Device::new(raw as _, &session.nvml) };
        Ok(query(&device)?)
    }
}

impl GpuBinding for NvmlBinding {
    fn init(&self) -> BindingResult<()> {
        let nvml = match &self.library_path {
            Some(path) => {
                debug!("NVML: carregando {}", path.display());
                Nvml::builder().lib_path(path.as_os_str()).init()?
            }
            None => Nvml::init()?,
        };
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Session {
            nvml,
            devices: DeviceTable::default(),
        });
        Ok(())
    }

    fn shutdown(&self) -> BindingResult<()> {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StatusCode::Uninitialized)?;
        Ok(session.nvml.shutdown()?)
    }

    fn device_count(&self) -> BindingResult<u32> {
        self.with_nvml(|nvml| nvml.device_count())
    }

    fn driver_version(&self) -> BindingResult<String> {
        self.with_nvml(|nvml| nvml.sys_driver_version())
    }

    fn device_by_index(&self, index: u32) -> BindingResult<DeviceHandle> {
        self.register(|nvml| nvml.device_by_index(index))
    }

    fn device_by_uuid(&self, uuid: &str) -> BindingResult<DeviceHandle> {
        self.register(|nvml| nvml.device_by_uuid(uuid))
    }

    fn device_by_pci_bus_id(&self, bus_id: &str) -> BindingResult<DeviceHandle> {
        self.register(|nvml| nvml.device_by_pci_bus_id(bus_id))
    }

    fn device_index(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.with_device(device, |d| d.index())
    }

    fn device_text(&self, device: DeviceHandle, field: TextField) -> BindingResult<String> {
        self.with_device(device, |d| match field {
            TextField::Name => d.name(),
            TextField::Uuid => d.uuid(),
            TextField::VbiosVersion => d.vbios_version(),
        })
    }

    fn pci_info(&self, device: DeviceHandle) -> BindingResult<PciInfo> {
        self.with_device(device, |d| {
            let pci = d.pci_info()?;
            Ok(PciInfo {
                bus_id: pci.bus_id,
                domain: pci.domain,
                bus: pci.bus,
                device: pci.device,
                pci_device_id: pci.pci_device_id,
                pci_sub_system_id: pci.pci_sub_system_id.unwrap_or_default(),
            })
        })
    }

    fn pcie_link_generation(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.with_device(device, |d| d.current_pcie_link_gen())
    }

    fn pcie_link_width(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.with_device(device, |d| d.current_pcie_link_width())
    }

    fn clock(&self, device: DeviceHandle, domain: ClockDomain) -> BindingResult<u32> {
        let clock = match domain {
            ClockDomain::Graphics => Clock::Graphics,
            ClockDomain::Sm => Clock::SM,
            ClockDomain::Memory => Clock::Memory,
            ClockDomain::Video => Clock::Video,
        };
        self.with_device(device, |d| d.clock_info(clock))
    }

    fn temperature(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.with_device(device, |d| d.temperature(TemperatureSensor::Gpu))
    }

    fn fan_speed(&self, device: DeviceHandle) -> BindingResult<u32> {
        // NVML retorna % 0-100, NÃO RPM
        self.with_device(device, |d| d.fan_speed(0))
    }

    fn power_usage(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.with_device(device, |d| d.power_usage())
    }

    fn power_default_limit(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.with_device(device, |d| d.power_management_limit_default())
    }

    fn utilization(&self, device: DeviceHandle) -> BindingResult<Utilization> {
        self.with_device(device, |d| {
            let util = d.utilization_rates()?;
            Ok(Utilization {
                gpu: util.gpu,
                memory: util.memory,
            })
        })
    }

    fn decoder_utilization(&self, device: DeviceHandle) -> BindingResult<EngineUtilization> {
        self.with_device(device, |d| {
            let info = d.decoder_utilization()?;
            Ok(EngineUtilization {
                utilization: info.utilization,
                sampling_period_us: info.sampling_period,
            })
        })
    }

    fn memory_info(&self, device: DeviceHandle) -> BindingResult<MemoryInfo> {
        self.with_device(device, |d| {
            let mem = d.memory_info()?;
            Ok(MemoryInfo {
                total: mem.total,
                used: mem.used,
                free: mem.free,
            })
        })
    }
}

impl From<NvmlError> for StatusCode {
    fn from(e: NvmlError) -> Self {
        match e {
            NvmlError::Uninitialized => StatusCode::Uninitialized,
            NvmlError::InvalidArg => StatusCode::InvalidArgument,
            NvmlError::NotSupported => StatusCode::NotSupported,
            NvmlError::NoPermission => StatusCode::NoPermission,
            NvmlError::NotFound => StatusCode::NotFound,
            NvmlError::InsufficientSize(_) => StatusCode::InsufficientSize,
            NvmlError::DriverNotLoaded => StatusCode::DriverNotLoaded,
            NvmlError::Timeout => StatusCode::Timeout,
            NvmlError::LibraryNotFound | NvmlError::LibloadingError(_) => {
                StatusCode::LibraryNotFound
            }
            NvmlError::FunctionNotFound | NvmlError::FailedToLoadSymbol(_) => {
                StatusCode::FunctionNotFound
            }
            NvmlError::GpuLost => StatusCode::GpuLost,
            NvmlError::ResetRequired => StatusCode::ResetRequired,
            other => {
                debug!("NVML: erro sem mapeamento direto: {other}");
                StatusCode::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_before_init_are_uninitialized() {
        let binding = NvmlBinding::new(None);
        assert_eq!(binding.device_count(), Err(StatusCode::Uninitialized));
        assert_eq!(
            binding.temperature(DeviceHandle::new(0)),
            Err(StatusCode::Uninitialized)
        );
    }

    #[test]
    fn device_table_keeps_one_slot_per_gpu() {
        let table = DeviceTable::default();
        let a = table.intern(0x1000);
        let b = table.intern(0x2000);
        assert_ne!(a, b);
        assert_eq!(table.intern(0x1000), a);
        assert_eq!(table.get(b), Some(0x2000));
        assert_eq!(table.get(DeviceHandle::new(7)), None);
    }

    #[test]
    fn shutdown_without_init_is_uninitialized() {
        let binding = NvmlBinding::new(None);
        assert_eq!(binding.shutdown(), Err(StatusCode::Uninitialized));
    }

    #[test]
    fn nvml_errors_map_to_status() {
        assert_eq!(StatusCode::from(NvmlError::NotSupported), StatusCode::NotSupported);
        assert_eq!(StatusCode::from(NvmlError::GpuLost), StatusCode::GpuLost);
        assert_eq!(
            StatusCode::from(NvmlError::InsufficientSize(Some(64))),
            StatusCode::InsufficientSize
        );
        assert_eq!(
            StatusCode::from(NvmlError::FailedToLoadSymbol("nvmlInit_v2".into())),
            StatusCode::FunctionNotFound
        );
    }
}
