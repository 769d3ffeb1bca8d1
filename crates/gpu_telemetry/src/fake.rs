//! Binding de teste: GPUs em memória e falhas injetáveis por chamada.
//!
//! Disponível fora deste crate com a feature `test-util`. Cada GPU simulada
//! tem um número de série físico; os handles emitidos apontam para ele, não
//! para a posição na enumeração.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::binding::GpuBinding;
use crate::status::{BindingResult, StatusCode};
use crate::types::{
    ClockDomain, DeviceHandle, EngineUtilization, MemoryInfo, PciInfo, TextField, Utilization,
};

/// Chamada da binding que pode ser forçada a falhar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Init,
    Shutdown,
    DeviceCount,
    DriverVersion,
    DeviceByIndex,
    DeviceIndex,
    Text(TextField),
    PciInfo,
    PcieLinkGeneration,
    PcieLinkWidth,
    Clock(ClockDomain),
    Temperature,
    FanSpeed,
    PowerUsage,
    PowerDefaultLimit,
    Utilization,
    DecoderUtilization,
    MemoryInfo,
}

/// Uma GPU simulada.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    /// Identidade física (o que o handle guarda)
    pub serial: u32,
    pub name: String,
    pub uuid: String,
    pub vbios: String,
    pub pci: PciInfo,
    pub link_gen: u32,
    pub link_width: u32,
    pub clocks: HashMap<ClockDomain, u32>,
    pub temperature: u32,
    pub fan: u32,
    pub power_mw: u32,
    pub power_limit_mw: u32,
    pub utilization: Utilization,
    pub decoder: EngineUtilization,
    pub memory: MemoryInfo,
}

impl FakeDevice {
    pub fn sample(index: u32) -> Self {
        Self {
            serial: index,
            name: format!("NVIDIA GeForce RTX 3080 #{index}"),
            uuid: format!("GPU-0000000{index}-1111-2222-3333-444444444444"),
            vbios: "94.02.42.00.A9".into(),
            pci: PciInfo {
                bus_id: format!("00000000:0{}:00.0", index + 1),
                domain: 0,
                bus: index + 1,
                device: 0,
                pci_device_id: 0x2206_10DE,
                pci_sub_system_id: 0x3895_1462,
            },
            link_gen: 4,
            link_width: 16,
            clocks: HashMap::from([
                (ClockDomain::Graphics, 1710),
                (ClockDomain::Sm, 1710),
                (ClockDomain::Memory, 9501),
                (ClockDomain::Video, 1545),
            ]),
            temperature: 64,
            fan: 47,
            power_mw: 240_000,
            power_limit_mw: 320_000,
            utilization: Utilization { gpu: 93, memory: 41 },
            decoder: EngineUtilization {
                utilization: 12,
                sampling_period_us: 167_000,
            },
            memory: MemoryInfo {
                total: 8_000_000_000,
                used: 4_000_000_000,
                free: 4_000_000_000,
            },
        }
    }
}

#[derive(Default)]
struct State {
    devices: Vec<FakeDevice>,
    failures: HashMap<Call, StatusCode>,
    /// Índices enumerados que não resolvem
    hidden: HashSet<u32>,
}

/// Binding em memória com contadores de init/shutdown.
pub struct FakeBinding {
    state: Mutex<State>,
    driver_version: String,
    init_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl FakeBinding {
    pub fn with_devices(count: u32) -> Self {
        Self {
            state: Mutex::new(State {
                devices: (0..count).map(FakeDevice::sample).collect(),
                failures: HashMap::new(),
                hidden: HashSet::new(),
            }),
            driver_version: "535.54.03".into(),
            init_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Faz `call` falhar com `status` até `heal`.
    pub fn fail(&self, call: Call, status: StatusCode) {
        self.state().failures.insert(call, status);
    }

    pub fn heal(&self, call: Call) {
        self.state().failures.remove(&call);
    }

    /// Altera uma GPU simulada.
    pub fn edit(&self, index: u32, f: impl FnOnce(&mut FakeDevice)) {
        if let Some(dev) = self.state().devices.get_mut(index as usize) {
            f(dev);
        }
    }

    /// A GPU continua contada na enumeração, mas não resolve pelo índice.
    pub fn hide(&self, index: u32) {
        self.state().hidden.insert(index);
    }

    /// Simula hot-unplug: a GPU some da enumeração e os seus handles passam a
    /// falhar com `GpuLost`. As GPUs seguintes sobem uma posição.
    pub fn unplug(&self, index: u32) {
        let mut state = self.state();
        if (index as usize) < state.devices.len() {
            state.devices.remove(index as usize);
        }
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    fn check(&self, call: Call) -> BindingResult<()> {
        match self.state().failures.get(&call) {
            Some(status) => Err(*status),
            None => Ok(()),
        }
    }

    fn device<T>(
        &self,
        handle: DeviceHandle,
        call: Call,
        read: impl FnOnce(&FakeDevice) -> T,
    ) -> BindingResult<T> {
        self.check(call)?;
        let state = self.state();
        let dev = state
            .devices
            .iter()
            .find(|d| d.serial == handle.raw())
            .ok_or(StatusCode::GpuLost)?;
        Ok(read(dev))
    }
}

impl GpuBinding for FakeBinding {
    fn init(&self) -> BindingResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Call::Init)
    }

    fn shutdown(&self) -> BindingResult<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Call::Shutdown)
    }

    fn device_count(&self) -> BindingResult<u32> {
        self.check(Call::DeviceCount)?;
        Ok(self.state().devices.len() as u32)
    }

    fn driver_version(&self) -> BindingResult<String> {
        self.check(Call::DriverVersion)?;
        Ok(self.driver_version.clone())
    }

    fn device_by_index(&self, index: u32) -> BindingResult<DeviceHandle> {
        self.check(Call::DeviceByIndex)?;
        let state = self.state();
        if state.hidden.contains(&index) {
            Err(StatusCode::NotFound)
        } else {
            state
                .devices
                .get(index as usize)
                .map(|d| DeviceHandle::new(d.serial))
                .ok_or(StatusCode::InvalidArgument)
        }
    }

    fn device_by_uuid(&self, uuid: &str) -> BindingResult<DeviceHandle> {
        self.state()
            .devices
            .iter()
            .find(|d| d.uuid == uuid)
            .map(|d| DeviceHandle::new(d.serial))
            .ok_or(StatusCode::NotFound)
    }

    fn device_by_pci_bus_id(&self, bus_id: &str) -> BindingResult<DeviceHandle> {
        self.state()
            .devices
            .iter()
            .find(|d| d.pci.bus_id.eq_ignore_ascii_case(bus_id))
            .map(|d| DeviceHandle::new(d.serial))
            .ok_or(StatusCode::NotFound)
    }

    fn device_index(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.check(Call::DeviceIndex)?;
        self.state()
            .devices
            .iter()
            .position(|d| d.serial == device.raw())
            .map(|i| i as u32)
            .ok_or(StatusCode::GpuLost)
    }

    fn device_text(&self, device: DeviceHandle, field: TextField) -> BindingResult<String> {
        self.device(device, Call::Text(field), |d| match field {
            TextField::Name => d.name.clone(),
            TextField::Uuid => d.uuid.clone(),
            TextField::VbiosVersion => d.vbios.clone(),
        })
    }

    fn pci_info(&self, device: DeviceHandle) -> BindingResult<PciInfo> {
        self.device(device, Call::PciInfo, |d| d.pci.clone())
    }

    fn pcie_link_generation(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.device(device, Call::PcieLinkGeneration, |d| d.link_gen)
    }

    fn pcie_link_width(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.device(device, Call::PcieLinkWidth, |d| d.link_width)
    }

    fn clock(&self, device: DeviceHandle, domain: ClockDomain) -> BindingResult<u32> {
        self.device(device, Call::Clock(domain), |d| {
            d.clocks.get(&domain).copied()
        })?
        .ok_or(StatusCode::NotSupported)
    }

    fn temperature(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.device(device, Call::Temperature, |d| d.temperature)
    }

    fn fan_speed(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.device(device, Call::FanSpeed, |d| d.fan)
    }

    fn power_usage(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.device(device, Call::PowerUsage, |d| d.power_mw)
    }

    fn power_default_limit(&self, device: DeviceHandle) -> BindingResult<u32> {
        self.device(device, Call::PowerDefaultLimit, |d| d.power_limit_mw)
    }

    fn utilization(&self, device: DeviceHandle) -> BindingResult<Utilization> {
        self.device(device, Call::Utilization, |d| d.utilization)
    }

    fn decoder_utilization(&self, device: DeviceHandle) -> BindingResult<EngineUtilization> {
        self.device(device, Call::DecoderUtilization, |d| d.decoder)
    }

    fn memory_info(&self, device: DeviceHandle) -> BindingResult<MemoryInfo> {
        self.device(device, Call::MemoryInfo, |d| d.memory)
    }
}
