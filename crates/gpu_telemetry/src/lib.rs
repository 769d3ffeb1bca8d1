//! # GPU Telemetry
//!
//! Núcleo de telemetria de GPUs NVIDIA: ciclo de vida da NVML, resolução de
//! dispositivos e o protocolo de atualização de sensores com política de
//! falha parcial.
//!
//! ## Módulos
//! - [`library`] – Init/shutdown único por processo, tolerante a falhas
//! - [`resolver`] – Índice / UUID / bus id → handle
//! - [`adapter`] – Catálogo de sensores e `update()` por GPU
//! - [`report`] – Relatório textual de identidade
//! - [`binding`] / [`nvml_binding`] – Superfície da NVML
//! - [`config`] – Configuração unificada via TOML

pub mod adapter;
pub mod binding;
pub mod config;
pub mod library;
pub mod nvml_binding;
pub mod report;
pub mod resolver;
pub mod sensor;
pub mod status;
pub mod types;

/// Binding em memória para testes (feature `test-util`).
#[cfg(any(test, feature = "test-util"))]
pub mod fake;

// Re-exports convenientes
pub use adapter::{GpuAdapter, Metric, MetricFailure};
pub use config::{AppConfig, LibraryConfig, MonitorConfig};
pub use library::{LibrarySearch, TelemetryLibrary};
pub use resolver::{DeviceResolver, DeviceSelector};
pub use sensor::{QueryError, Reading, Sensor, SensorKind, SensorRegistry, SensorSlot};
pub use status::StatusCode;
pub use types::GpuSnapshot;
