//! Registros de resultado da binding e snapshot serializável de uma GPU.
//!
//! Os registros espelham as structs de tamanho fixo da NVML; o snapshot é o
//! que o host consome a cada ciclo.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Handle de dispositivo
// ──────────────────────────────────────────────

/// Token opaco que identifica uma GPU física para a binding.
///
/// Emitido pela binding na resolução por índice, UUID ou bus id e só tem
/// significado para ela. Não é o índice de enumeração: se a enumeração mudar,
/// o handle continua na mesma GPU, e depois de um hot-unplug as consultas
/// falham com status, nunca com pânico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

// ──────────────────────────────────────────────
// Domínios de clock
// ──────────────────────────────────────────────

/// Domínio de clock consultado por `clock_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockDomain {
    Graphics,
    Sm,
    Memory,
    Video,
}

// ──────────────────────────────────────────────
// Registros de resultado
// ──────────────────────────────────────────────

/// Memória do framebuffer (bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Utilização combinada do core e do controlador de memória (0–100%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Utilization {
    pub gpu: u32,
    pub memory: u32,
}

/// Utilização de um engine de vídeo e o período de amostragem (µs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineUtilization {
    pub utilization: u32,
    pub sampling_period_us: u32,
}

/// Identificação PCI do dispositivo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PciInfo {
    /// Tupla `domain:bus:device.function`
    pub bus_id: String,
    pub domain: u32,
    pub bus: u32,
    pub device: u32,
    /// 16 bits de device id (alto) + 16 bits de vendor id (baixo)
    pub pci_device_id: u32,
    pub pci_sub_system_id: u32,
}

impl PciInfo {
    pub fn device_id(&self) -> u32 {
        self.pci_device_id >> 16
    }

    pub fn vendor_id(&self) -> u32 {
        self.pci_device_id & 0xFFFF
    }
}

// ──────────────────────────────────────────────
// Campos de texto de tamanho fixo
// ──────────────────────────────────────────────

/// Campo de texto por dispositivo, cada um com o buffer fixo da NVML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Name,
    Uuid,
    VbiosVersion,
}

/// Buffer do nome do dispositivo (`NVML_DEVICE_NAME_V2_BUFFER_SIZE`).
pub const DEVICE_NAME_BUFFER_SIZE: usize = 96;
/// Buffer do UUID.
pub const DEVICE_UUID_BUFFER_SIZE: usize = 80;
/// Buffer da versão da VBIOS.
pub const DEVICE_VBIOS_VERSION_BUFFER_SIZE: usize = 32;
/// Buffer da versão do driver.
pub const SYSTEM_DRIVER_VERSION_BUFFER_SIZE: usize = 80;
/// Buffer do bus id PCI.
pub const DEVICE_PCI_BUS_ID_BUFFER_SIZE: usize = 32;

impl TextField {
    /// Capacidade do buffer, incluindo o terminador nulo.
    pub fn capacity(self) -> usize {
        match self {
            TextField::Name => DEVICE_NAME_BUFFER_SIZE,
            TextField::Uuid => DEVICE_UUID_BUFFER_SIZE,
            TextField::VbiosVersion => DEVICE_VBIOS_VERSION_BUFFER_SIZE,
        }
    }
}

/// Limita `text` ao que cabe em um buffer de `capacity` bytes com terminador.
///
/// Corta em fronteira de caractere e descarta tudo após um `\0` embutido.
pub fn bounded_text(text: &str, capacity: usize) -> String {
    let text = text.split('\0').next().unwrap_or_default();
    let max = capacity.saturating_sub(1);
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// Valores atuais de uma GPU. `None` = nunca lido com sucesso.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GpuSnapshot {
    /// Identificador de hardware (ex: "/nvidiagpu/0")
    pub id: String,
    pub name: String,
    /// Clock do core (MHz)
    pub clock_core: Option<f32>,
    /// Clock da memória (MHz)
    pub clock_mem: Option<f32>,
    /// Clock dos shaders (MHz)
    pub clock_shader: Option<f32>,
    /// Temperatura do die (°C)
    pub temp: Option<f32>,
    /// Fan (% – a NVML não fornece RPM confiável)
    pub fan: Option<f32>,
    /// Potência instantânea (W)
    pub power: Option<f32>,
    /// Potência em % do limite padrão
    pub tdp: Option<f32>,
    /// Carga do core (%)
    pub load_core: Option<f32>,
    /// Carga do controlador de memória (%)
    pub load_mem_ctrl: Option<f32>,
    /// Carga do decoder de vídeo (%)
    pub load_video: Option<f32>,
    /// VRAM em uso (%)
    pub mem_percent: Option<f32>,
    pub mem_total_mb: Option<f32>,
    pub mem_used_mb: Option<f32>,
    pub mem_free_mb: Option<f32>,
}
