//! Superfície da biblioteca do fabricante usada pelo núcleo.
//!
//! A implementação real é [`NvmlBinding`](crate::nvml_binding::NvmlBinding);
//! os testes injetam um dublê que falha chamadas escolhidas.

use crate::status::BindingResult;
use crate::types::{
    ClockDomain, DeviceHandle, EngineUtilization, MemoryInfo, PciInfo, TextField, Utilization,
};

/// Chamadas à biblioteca de gerenciamento de GPU.
///
/// Todas as chamadas são síncronas e thread-safe. Texto é devolvido já limitado
/// ao buffer fixo correspondente pela camada acima.
pub trait GpuBinding: Send + Sync {
    // ── Ciclo de vida ──
    fn init(&self) -> BindingResult<()>;
    fn shutdown(&self) -> BindingResult<()>;

    // ── Sistema ──
    fn device_count(&self) -> BindingResult<u32>;
    fn driver_version(&self) -> BindingResult<String>;

    // ── Resolução ──
    fn device_by_index(&self, index: u32) -> BindingResult<DeviceHandle>;
    fn device_by_uuid(&self, uuid: &str) -> BindingResult<DeviceHandle>;
    fn device_by_pci_bus_id(&self, bus_id: &str) -> BindingResult<DeviceHandle>;

    // ── Identidade ──
    fn device_index(&self, device: DeviceHandle) -> BindingResult<u32>;
    fn device_text(&self, device: DeviceHandle, field: TextField) -> BindingResult<String>;
    fn pci_info(&self, device: DeviceHandle) -> BindingResult<PciInfo>;
    fn pcie_link_generation(&self, device: DeviceHandle) -> BindingResult<u32>;
    fn pcie_link_width(&self, device: DeviceHandle) -> BindingResult<u32>;

    // ── Métricas ──
    /// Frequência (MHz).
    fn clock(&self, device: DeviceHandle, domain: ClockDomain) -> BindingResult<u32>;
    /// Temperatura do die (°C).
    fn temperature(&self, device: DeviceHandle) -> BindingResult<u32>;
    /// Nível do fan (%).
    fn fan_speed(&self, device: DeviceHandle) -> BindingResult<u32>;
    /// Potência instantânea (mW).
    fn power_usage(&self, device: DeviceHandle) -> BindingResult<u32>;
    /// Limite padrão de potência (mW).
    fn power_default_limit(&self, device: DeviceHandle) -> BindingResult<u32>;
    fn utilization(&self, device: DeviceHandle) -> BindingResult<Utilization>;
    fn decoder_utilization(&self, device: DeviceHandle) -> BindingResult<EngineUtilization>;
    fn memory_info(&self, device: DeviceHandle) -> BindingResult<MemoryInfo>;
}
