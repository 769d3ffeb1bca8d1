//! Adaptador de telemetria de uma GPU.
//!
//! Cada adaptador tem um [`DeviceHandle`] e um catálogo fixo de sensores.
//! `update()` consulta cada métrica de forma independente: a falha de uma
//! (ex: decoder não suportado em GPU antiga) nunca impede as outras, e o
//! sensor que falhou mantém o último valor lido.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::library::TelemetryLibrary;
use crate::resolver::{DeviceResolver, DeviceSelector};
use crate::sensor::{QueryError, Sensor, SensorKind, SensorRegistry, SensorSlot};
use crate::status::BindingResult;
use crate::types::{ClockDomain, DeviceHandle, GpuSnapshot, MemoryInfo, TextField, bounded_text};

/// Bytes → MiB.
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Domínios consultados, na ordem dos sensores de clock.
const CLOCK_DOMAINS: [ClockDomain; 3] = [ClockDomain::Graphics, ClockDomain::Memory, ClockDomain::Sm];

// ──────────────────────────────────────────────
// Catálogo
// ──────────────────────────────────────────────

/// Catálogo fixo de sensores de uma GPU NVIDIA.
#[derive(Debug, Clone)]
pub struct GpuSensors {
    /// Core, memória, shaders (MHz)
    pub clocks: [Sensor; 3],
    pub temperature: Sensor,
    /// Fan em % (a NVML não expõe conversão confiável para RPM)
    pub fan: Sensor,
    /// Potência (W) e % do limite padrão
    pub power: [Sensor; 2],
    /// Core, controlador de memória, decoder de vídeo (%)
    pub loads: [Sensor; 3],
    /// % usada, total, usada, livre (MiB)
    pub memory: [Sensor; 4],
}

impl GpuSensors {
    fn new() -> Self {
        Self {
            clocks: [
                Sensor::new(SensorSlot::new("GPU Core", SensorKind::Clock, 0)),
                Sensor::new(SensorSlot::new("GPU Memory", SensorKind::Clock, 2)),
                Sensor::new(SensorSlot::new("GPU Shader", SensorKind::Clock, 3)),
            ],
            temperature: Sensor::new(SensorSlot::new("GPU Core", SensorKind::Temperature, 0)),
            fan: Sensor::new(SensorSlot::new("GPU Fan", SensorKind::Level, 0)),
            power: [
                Sensor::new(SensorSlot::new("GPU Power", SensorKind::Power, 0)),
                Sensor::new(SensorSlot::new("GPU TDP", SensorKind::Level, 1)),
            ],
            loads: [
                Sensor::new(SensorSlot::new("GPU Core", SensorKind::Load, 0)),
                Sensor::new(SensorSlot::new("GPU Memory Controller", SensorKind::Load, 1)),
                Sensor::new(SensorSlot::new("GPU Video Engine", SensorKind::Load, 2)),
            ],
            memory: [
                Sensor::new(SensorSlot::new("GPU Memory", SensorKind::Load, 3)),
                Sensor::new(SensorSlot::new("GPU Memory Total", SensorKind::SmallData, 0)),
                Sensor::new(SensorSlot::new("GPU Memory Used", SensorKind::SmallData, 1)),
                Sensor::new(SensorSlot::new("GPU Memory Free", SensorKind::SmallData, 2)),
            ],
        }
    }

    /// Todos os sensores, na ordem de registro.
    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.clocks
            .iter()
            .chain(std::iter::once(&self.temperature))
            .chain(std::iter::once(&self.fan))
            .chain(self.power.iter())
            .chain(self.loads.iter())
            .chain(self.memory.iter())
    }
}

// ──────────────────────────────────────────────
// Falhas por ciclo
// ──────────────────────────────────────────────

/// Métrica consultada no ciclo de atualização.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Clock(ClockDomain),
    Temperature,
    Fan,
    Power,
    Tdp,
    Utilization,
    Decoder,
    Memory,
    MemoryPercent,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Clock(domain) => write!(f, "clock {domain:?}"),
            Metric::Temperature => f.write_str("temperatura"),
            Metric::Fan => f.write_str("fan"),
            Metric::Power => f.write_str("potência"),
            Metric::Tdp => f.write_str("TDP"),
            Metric::Utilization => f.write_str("utilização"),
            Metric::Decoder => f.write_str("decoder"),
            Metric::Memory => f.write_str("memória"),
            Metric::MemoryPercent => f.write_str("memória (%)"),
        }
    }
}

/// Uma consulta que falhou no último ciclo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricFailure {
    pub metric: Metric,
    pub error: QueryError,
}

// ──────────────────────────────────────────────
// Adaptador
// ──────────────────────────────────────────────

/// Telemetria de uma GPU.
pub struct GpuAdapter {
    pub(crate) library: Arc<TelemetryLibrary>,
    pub(crate) device: Option<DeviceHandle>,
    pub(crate) name: String,
    id: String,
    index: Option<u32>,
    sensors: GpuSensors,
    failures: Vec<MetricFailure>,
    /// Métricas cuja falha já foi logada (evita repetir a cada ciclo)
    reported: HashSet<Metric>,
}

impl GpuAdapter {
    /// Cria o adaptador da GPU no índice de enumeração `index`.
    pub fn new(
        library: Arc<TelemetryLibrary>,
        index: u32,
        registry: &mut dyn SensorRegistry,
    ) -> Self {
        Self::with_selector(library, &DeviceSelector::Index(index), registry)
    }

    /// Cria o adaptador da GPU apontada por `selector`.
    ///
    /// Se a resolução falhar, o adaptador fica desativado: nome vazio,
    /// catálogo alocado, `update()` e relatório sem efeito. Nesse caso o
    /// host não recebe nenhum `activate` no `registry`.
    pub fn with_selector(
        library: Arc<TelemetryLibrary>,
        selector: &DeviceSelector,
        registry: &mut dyn SensorRegistry,
    ) -> Self {
        library.ensure_initialized();

        let device = match DeviceResolver::new(library.clone()).resolve(selector) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("✗ GPU {selector}: resolução falhou ({e}), adaptador desativado");
                None
            }
        };

        let index = match (selector, device) {
            (DeviceSelector::Index(i), _) => Some(*i),
            (_, Some(handle)) => library.binding().device_index(handle).ok(),
            (_, None) => None,
        };

        let id = match index {
            Some(i) => format!("/nvidiagpu/{i}"),
            None => format!("/nvidiagpu/{selector}"),
        };

        let name = match device {
            Some(handle) => library
                .binding()
                .device_text(handle, TextField::Name)
                .map(|n| bounded_text(&n, TextField::Name.capacity()))
                .unwrap_or_else(|e| {
                    debug!("GPU {id}: nome indisponível ({e})");
                    format!("NVIDIA GPU {}", index.unwrap_or_default())
                }),
            None => String::new(),
        };

        let sensors = GpuSensors::new();
        if device.is_some() {
            for sensor in sensors.iter() {
                registry.activate(&id, sensor.slot());
            }
            info!("✓ GPU {id}: {name}");
        }

        Self {
            library,
            device,
            name,
            id,
            index,
            sensors,
            failures: Vec::new(),
            reported: HashSet::new(),
        }
    }

    /// Atualiza todos os sensores. Sem efeito se desativado ou após `close()`.
    pub fn update(&mut self) {
        let Some(device) = self.device else {
            return;
        };
        if !self.library.is_available() {
            return;
        }
        let binding = self.library.binding();
        let sensors = &mut self.sensors;

        let mut failures = Vec::new();
        let mut note = |metric: Metric, result: Result<(), QueryError>| {
            if let Err(error) = result {
                failures.push(MetricFailure { metric, error });
            }
        };

        // Clocks (MHz)
        for (sensor, domain) in sensors.clocks.iter_mut().zip(CLOCK_DOMAINS) {
            note(
                Metric::Clock(domain),
                sensor.apply(read(binding.clock(device, domain), |mhz| mhz as f32)),
            );
        }

        // Temperatura (°C)
        note(
            Metric::Temperature,
            sensors
                .temperature
                .apply(read(binding.temperature(device), |t| t as f32)),
        );

        // Fan (%)
        note(
            Metric::Fan,
            sensors.fan.apply(read(binding.fan_speed(device), |pct| pct as f32)),
        );

        // Potência (mW → W) e % do limite padrão
        let draw = binding.power_usage(device);
        note(
            Metric::Power,
            sensors.power[0].apply(read(draw, |mw| mw as f32 / 1000.0)),
        );
        let tdp = draw.map_err(QueryError::from).and_then(|mw| {
            let limit = binding.power_default_limit(device)?;
            tdp_percent(mw, limit)
        });
        note(Metric::Tdp, sensors.power[1].apply(tdp));

        // Utilização core + controlador de memória (uma chamada)
        match binding.utilization(device) {
            Ok(util) => {
                sensors.loads[0].set(util.gpu as f32);
                sensors.loads[1].set(util.memory as f32);
            }
            Err(e) => note(Metric::Utilization, Err(e.into())),
        }

        // Decoder de vídeo (o período de amostragem não vira sensor)
        note(
            Metric::Decoder,
            sensors.loads[2].apply(read(binding.decoder_utilization(device), |d| {
                d.utilization as f32
            })),
        );

        // VRAM (bytes → MiB)
        match binding.memory_info(device) {
            Ok(mem) => {
                note(Metric::MemoryPercent, sensors.memory[0].apply(memory_percent(&mem)));
                sensors.memory[1].set(to_mib(mem.total));
                sensors.memory[2].set(to_mib(mem.used));
                sensors.memory[3].set(to_mib(mem.free));
            }
            Err(e) => note(Metric::Memory, Err(e.into())),
        }

        self.log_transitions(&failures);
        self.failures = failures;
    }

    /// Loga cada métrica só quando começa a falhar e quando se recupera.
    fn log_transitions(&mut self, failures: &[MetricFailure]) {
        for f in failures {
            if self.reported.insert(f.metric) {
                debug!("GPU {}: {} indisponível ({})", self.id, f.metric, f.error);
            }
        }
        let id = &self.id;
        self.reported.retain(|metric| {
            let still_failing = failures.iter().any(|f| f.metric == *metric);
            if !still_failing {
                debug!("GPU {id}: {metric} voltou a responder");
            }
            still_failing
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.device.is_some()
    }

    /// Nome do dispositivo (vazio se desativado).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identificador de hardware (ex: "/nvidiagpu/0").
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn sensors(&self) -> &GpuSensors {
        &self.sensors
    }

    /// Consultas que falharam no último `update()`.
    pub fn last_failures(&self) -> &[MetricFailure] {
        &self.failures
    }

    /// Valores atuais para o host.
    pub fn snapshot(&self) -> GpuSnapshot {
        let s = &self.sensors;
        GpuSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            clock_core: s.clocks[0].value(),
            clock_mem: s.clocks[1].value(),
            clock_shader: s.clocks[2].value(),
            temp: s.temperature.value(),
            fan: s.fan.value(),
            power: s.power[0].value(),
            tdp: s.power[1].value(),
            load_core: s.loads[0].value(),
            load_mem_ctrl: s.loads[1].value(),
            load_video: s.loads[2].value(),
            mem_percent: s.memory[0].value(),
            mem_total_mb: s.memory[1].value(),
            mem_used_mb: s.memory[2].value(),
            mem_free_mb: s.memory[3].value(),
        }
    }
}

// ──────────────────────────────────────────────
// Conversões
// ──────────────────────────────────────────────

fn read<T>(result: BindingResult<T>, convert: impl FnOnce(T) -> f32) -> Result<f32, QueryError> {
    result.map(convert).map_err(QueryError::from)
}

/// Potência em % do limite padrão. Limite zero não gera valor.
fn tdp_percent(draw_mw: u32, limit_mw: u32) -> Result<f32, QueryError> {
    if limit_mw == 0 {
        return Err(QueryError::ZeroPowerLimit);
    }
    Ok((draw_mw as f64 * 100.0 / limit_mw as f64) as f32)
}

fn memory_percent(mem: &MemoryInfo) -> Result<f32, QueryError> {
    if mem.total == 0 {
        return Err(QueryError::ZeroMemoryTotal);
    }
    Ok((mem.used as f64 * 100.0 / mem.total as f64) as f32)
}

fn to_mib(bytes: u64) -> f32 {
    (bytes as f64 / BYTES_PER_MIB) as f32
}
