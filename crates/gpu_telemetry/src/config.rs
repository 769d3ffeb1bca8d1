//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável, com valores padrão para
//! qualquer campo ausente.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::resolver::DeviceSelector;

/// Erros ao salvar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de serialização TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Onde e como carregar a biblioteca NVML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Diretório usado durante o init (vazio = padrão da plataforma)
    pub search_dir: String,
    /// Caminho completo da biblioteca (vazio = nome padrão do sistema)
    pub library_path: String,
}

/// Configuração do loop de monitoramento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Intervalo entre atualizações em segundos
    pub interval_secs: f64,
    /// Número de ciclos antes de sair (0 = infinito)
    pub cycles: u64,
    /// GPUs monitoradas: índice, UUID ou bus id (vazio = todas)
    pub devices: Vec<String>,
    /// Imprime o relatório de cada GPU na inicialização
    pub report_on_start: bool,
    /// Filtro de log quando `RUST_LOG` não está definido
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            cycles: 0,
            devices: Vec::new(),
            report_on_start: false,
            log_level: "info".into(),
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub library: LibraryConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Seletores de GPU configurados. Entradas inválidas são ignoradas com aviso.
    pub fn device_selectors(&self) -> Vec<DeviceSelector> {
        self.monitor
            .devices
            .iter()
            .filter_map(|d| match d.parse::<DeviceSelector>() {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!("{e}");
                    None
                }
            })
            .collect()
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(0.1..=60.0).contains(&self.monitor.interval_secs) {
            errors.push(format!(
                "Intervalo do monitor inválido: {} (0.1–60.0)",
                self.monitor.interval_secs
            ));
        }
        for d in &self.monitor.devices {
            if let Err(e) = d.parse::<DeviceSelector>() {
                errors.push(e);
            }
        }
        if !self.library.search_dir.is_empty() && !Path::new(&self.library.search_dir).is_dir() {
            errors.push(format!(
                "Diretório da biblioteca não existe: {}",
                self.library.search_dir
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.monitor.interval_secs, parsed.monitor.interval_secs);
        assert_eq!(config.monitor.log_level, parsed.monitor.log_level);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[monitor]
devices = ["0", "GPU-abc"]
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.monitor.devices.len(), 2);
        // Outros campos devem ter valor padrão
        assert_eq!(config.monitor.interval_secs, 1.0);
        assert!(config.library.search_dir.is_empty());
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.monitor.interval_secs = 0.0;
        config.monitor.devices = vec!["placa".into()];
        config.library.search_dir = "/definitely/not/a/dir".into();
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn selectors_skip_invalid_entries() {
        let mut config = AppConfig::default();
        config.monitor.devices = vec!["1".into(), "".into(), "0000:65:00.0".into()];
        assert_eq!(
            config.device_selectors(),
            vec![
                DeviceSelector::Index(1),
                DeviceSelector::PciBusId("0000:65:00.0".into())
            ]
        );
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("gpu_monitor_cfg_{}.toml", std::process::id()));
        let mut config = AppConfig::default();
        config.monitor.cycles = 7;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.monitor.cycles, 7);
        let _ = std::fs::remove_file(&path);
    }
}
