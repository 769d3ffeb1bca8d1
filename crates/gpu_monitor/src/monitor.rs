//! GPU Monitor – um adaptador por GPU selecionada, sobre a NVML do processo.
//!
//! A ordem de uso é sempre: `new` → `collect`/`reports` quantas vezes quiser
//! → `close` uma vez, depois que nenhum adaptador está mais em uso.

use std::sync::Arc;

use gpu_telemetry::config::AppConfig;
use gpu_telemetry::{
    DeviceSelector, GpuAdapter, GpuSnapshot, SensorRegistry, SensorSlot, TelemetryLibrary,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Registro de sensores do host: guarda o que cada adaptador ativou.
#[derive(Debug, Default)]
pub struct SensorBoard {
    entries: Vec<(String, SensorSlot)>,
}

impl SensorBoard {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sensores ativados para um identificador de hardware.
    pub fn for_hardware<'a>(&'a self, hardware_id: &'a str) -> impl Iterator<Item = &'a SensorSlot> {
        self.entries
            .iter()
            .filter(move |(id, _)| id == hardware_id)
            .map(|(_, slot)| slot)
    }
}

impl SensorRegistry for SensorBoard {
    fn activate(&mut self, hardware_id: &str, slot: &SensorSlot) {
        debug!("  {hardware_id}: {} [{}] #{}", slot.name, slot.unit(), slot.index);
        self.entries.push((hardware_id.to_string(), *slot));
    }
}

/// Saída de `--once`.
#[derive(Serialize)]
struct Dump<'a> {
    gpus: &'a [GpuSnapshot],
}

/// Serializa um ciclo de snapshots como TOML (`[[gpus]]`).
pub fn snapshots_toml(snapshots: &[GpuSnapshot]) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Dump { gpus: snapshots })
}

/// Monitor de GPUs principal.
pub struct GpuMonitor {
    library: Arc<TelemetryLibrary>,
    gpus: Vec<GpuAdapter>,
    board: SensorBoard,
}

impl GpuMonitor {
    /// Cria o monitor sobre a NVML compartilhada do processo.
    pub fn new(config: &AppConfig) -> Self {
        let library = TelemetryLibrary::shared(&config.library);
        Self::with_library(library, &config.device_selectors())
    }

    /// Cria o monitor sobre um ciclo de vida já construído.
    ///
    /// Sem seletores, monitora todas as GPUs enumeradas.
    pub fn with_library(library: Arc<TelemetryLibrary>, selectors: &[DeviceSelector]) -> Self {
        library.ensure_initialized();
        let mut board = SensorBoard::default();

        if !library.is_available() {
            warn!("✗ NVML indisponível: nenhuma GPU será monitorada");
            return Self {
                library,
                gpus: Vec::new(),
                board,
            };
        }

        let selectors: Vec<DeviceSelector> = if selectors.is_empty() {
            match library.device_count() {
                Ok(count) => (0..count).map(DeviceSelector::Index).collect(),
                Err(e) => {
                    warn!("✗ NVML: contagem de GPUs falhou ({e})");
                    Vec::new()
                }
            }
        } else {
            selectors.to_vec()
        };

        let gpus: Vec<GpuAdapter> = selectors
            .iter()
            .map(|s| GpuAdapter::with_selector(library.clone(), s, &mut board))
            .collect();

        let enabled = gpus.iter().filter(|g| g.is_enabled()).count();
        info!("✓ NVML: {enabled}/{} GPUs ativas", gpus.len());

        Self {
            library,
            gpus,
            board,
        }
    }

    pub fn gpus(&self) -> &[GpuAdapter] {
        &self.gpus
    }

    pub fn board(&self) -> &SensorBoard {
        &self.board
    }

    /// Atualiza todas as GPUs e retorna um snapshot de cada uma ativa.
    pub fn collect(&mut self) -> Vec<GpuSnapshot> {
        self.gpus
            .iter_mut()
            .filter(|g| g.is_enabled())
            .map(|g| {
                g.update();
                for failure in g.last_failures() {
                    debug!("GPU {}: {} falhou ({})", g.id(), failure.metric, failure.error);
                }
                g.snapshot()
            })
            .collect()
    }

    /// Relatórios de identidade das GPUs ativas, com os sensores registrados.
    pub fn reports(&self) -> Vec<String> {
        self.gpus
            .iter()
            .filter_map(|gpu| {
                let mut report = gpu.generate_report();
                if report.is_empty() {
                    return None;
                }
                let slots: Vec<&SensorSlot> = self.board.for_hardware(gpu.id()).collect();
                report.push_str(&format!("Sensores: {}\n", slots.len()));
                for slot in slots {
                    report.push_str(&format!("  {} [{}]\n", slot.name, slot.unit()));
                }
                Some(report)
            })
            .collect()
    }

    /// Encerra a NVML. Os adaptadores ficam inertes a partir daqui.
    pub fn close(&self) {
        self.library.close();
    }
}
