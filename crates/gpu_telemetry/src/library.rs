//! Ciclo de vida da biblioteca do fabricante (uma instância por processo).
//!
//! A inicialização é tentada uma única vez, mesmo com várias threads chamando
//! `ensure_initialized()` ao mesmo tempo. Se falhar, a biblioteca fica
//! indisponível até o fim do processo, sem nova tentativa. Nada aqui entra em
//! pânico: falhas viram `available = false` e uma linha de log.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};

use tracing::{debug, info, warn};

use crate::binding::GpuBinding;
use crate::config::LibraryConfig;
use crate::nvml_binding::NvmlBinding;
use crate::status::{BindingResult, StatusCode};
use crate::types::{SYSTEM_DRIVER_VERSION_BUFFER_SIZE, bounded_text};

// ──────────────────────────────────────────────
// Política de busca da biblioteca
// ──────────────────────────────────────────────

/// Onde a biblioteca compartilhada deve ser procurada durante o init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySearch {
    /// Caminho de busca padrão do sistema.
    SystemDefault,
    /// Troca o diretório corrente para `dir` durante o init e restaura depois.
    Redirect(PathBuf),
}

impl LibrarySearch {
    /// Política da plataforma atual.
    ///
    /// No Windows a `nvml.dll` antiga fica em
    /// `%ProgramW6432%\NVIDIA Corporation\NVSMI`, fora do caminho de busca.
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            match std::env::var_os("ProgramW6432") {
                Some(program_files) => LibrarySearch::Redirect(
                    PathBuf::from(program_files)
                        .join("NVIDIA Corporation")
                        .join("NVSMI"),
                ),
                None => LibrarySearch::SystemDefault,
            }
        } else {
            LibrarySearch::SystemDefault
        }
    }

    /// Política a partir da configuração (`search_dir` vazio = plataforma).
    pub fn from_config(config: &LibraryConfig) -> Self {
        if config.search_dir.is_empty() {
            Self::for_platform()
        } else {
            LibrarySearch::Redirect(PathBuf::from(&config.search_dir))
        }
    }

    pub fn requires_redirect(&self) -> bool {
        matches!(self, LibrarySearch::Redirect(_))
    }
}

/// Troca o diretório corrente e restaura o anterior no `drop`.
pub struct SearchDirGuard {
    previous: PathBuf,
}

impl SearchDirGuard {
    pub fn enter(dir: &Path) -> std::io::Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        Ok(Self { previous })
    }
}

impl Drop for SearchDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            warn!(
                "Não foi possível restaurar o diretório {}: {e}",
                self.previous.display()
            );
        }
    }
}

// ──────────────────────────────────────────────
// Biblioteca
// ──────────────────────────────────────────────

/// Dono do init/shutdown da binding e da flag de disponibilidade.
pub struct TelemetryLibrary {
    binding: Arc<dyn GpuBinding>,
    search: LibrarySearch,
    init: Once,
    available: AtomicBool,
}

impl TelemetryLibrary {
    /// Cria um ciclo de vida sobre uma binding injetada.
    pub fn new(binding: Arc<dyn GpuBinding>, search: LibrarySearch) -> Self {
        Self {
            binding,
            search,
            init: Once::new(),
            available: AtomicBool::new(false),
        }
    }

    /// Instância compartilhada do processo, sobre a NVML real.
    ///
    /// A configuração do primeiro chamador vale para o processo inteiro.
    pub fn shared(config: &LibraryConfig) -> Arc<Self> {
        static SHARED: OnceLock<Arc<TelemetryLibrary>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                let library_path = if config.library_path.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(&config.library_path))
                };
                Arc::new(TelemetryLibrary::new(
                    Arc::new(NvmlBinding::new(library_path)),
                    LibrarySearch::from_config(config),
                ))
            })
            .clone()
    }

    /// Inicializa a binding na primeira chamada; as seguintes não fazem nada.
    pub fn ensure_initialized(&self) {
        self.init.call_once(|| {
            let ok = self.try_init();
            self.available.store(ok, Ordering::Release);
        });
    }

    fn try_init(&self) -> bool {
        if cfg!(target_pointer_width = "32") {
            warn!("✗ NVML: não suportada em processos 32-bit");
            return false;
        }

        let _guard = match &self.search {
            LibrarySearch::SystemDefault => None,
            LibrarySearch::Redirect(dir) => match SearchDirGuard::enter(dir) {
                Ok(guard) => {
                    debug!("NVML: procurando biblioteca em {}", dir.display());
                    Some(guard)
                }
                Err(e) => {
                    warn!("✗ NVML: diretório {} inacessível: {e}", dir.display());
                    return false;
                }
            },
        };

        match self.binding.init() {
            Ok(()) => {
                info!("✓ NVML inicializada");
                true
            }
            Err(e) => {
                warn!("✗ NVML: não disponível ({e})");
                false
            }
        }
    }

    /// `true` se as consultas de métricas podem ser tentadas.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Encerra a binding. Sem efeito se já estiver indisponível.
    ///
    /// O shutdown vale para o processo inteiro: só chame quando nenhum
    /// adaptador ainda precisar de telemetria.
    pub fn close(&self) {
        if self
            .available
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        match self.binding.shutdown() {
            Ok(()) => info!("NVML encerrada"),
            Err(e) => warn!("Falha no shutdown da NVML: {e}"),
        }
    }

    pub fn binding(&self) -> &dyn GpuBinding {
        self.binding.as_ref()
    }

    /// Número de GPUs enumeradas pela binding.
    pub fn device_count(&self) -> BindingResult<u32> {
        if !self.is_available() {
            return Err(StatusCode::Uninitialized);
        }
        self.binding.device_count()
    }

    /// Versão do driver, limitada ao buffer fixo.
    pub fn driver_version(&self) -> BindingResult<String> {
        if !self.is_available() {
            return Err(StatusCode::Uninitialized);
        }
        let version = self.binding.driver_version()?;
        Ok(bounded_text(&version, SYSTEM_DRIVER_VERSION_BUFFER_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, FakeBinding};

    fn library(fake: &Arc<FakeBinding>) -> TelemetryLibrary {
        TelemetryLibrary::new(fake.clone(), LibrarySearch::SystemDefault)
    }

    #[test]
    fn ensure_initialized_calls_init_once() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = library(&fake);
        for _ in 0..5 {
            lib.ensure_initialized();
        }
        assert_eq!(fake.init_calls(), 1);
        assert!(lib.is_available());
    }

    #[test]
    fn concurrent_first_use_initializes_once() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = Arc::new(library(&fake));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lib = lib.clone();
                std::thread::spawn(move || {
                    lib.ensure_initialized();
                    lib.is_available()
                })
            })
            .collect();

        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(fake.init_calls(), 1);
    }

    #[test]
    fn failed_init_is_permanent() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        fake.fail(Call::Init, StatusCode::DriverNotLoaded);
        let lib = library(&fake);

        lib.ensure_initialized();
        assert!(!lib.is_available());

        // Mesmo que o driver "apareça", não há nova tentativa
        fake.heal(Call::Init);
        lib.ensure_initialized();
        assert!(!lib.is_available());
        assert_eq!(fake.init_calls(), 1);
    }

    #[test]
    fn close_twice_shuts_down_once() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = library(&fake);
        lib.ensure_initialized();

        lib.close();
        lib.close();

        assert!(!lib.is_available());
        assert_eq!(fake.shutdown_calls(), 1);
    }

    #[test]
    fn close_when_unavailable_is_noop() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = library(&fake);
        lib.close();
        assert_eq!(fake.shutdown_calls(), 0);
    }

    #[test]
    fn no_reinit_after_close() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = library(&fake);
        lib.ensure_initialized();
        lib.close();
        lib.ensure_initialized();
        assert!(!lib.is_available());
        assert_eq!(fake.init_calls(), 1);
    }

    #[test]
    fn unavailable_library_reports_uninitialized() {
        let fake = Arc::new(FakeBinding::with_devices(2));
        let lib = library(&fake);
        assert_eq!(lib.device_count(), Err(StatusCode::Uninitialized));
        assert_eq!(lib.driver_version(), Err(StatusCode::Uninitialized));
    }

    #[test]
    fn redirect_to_missing_dir_fails_soft() {
        let fake = Arc::new(FakeBinding::with_devices(1));
        let lib = TelemetryLibrary::new(
            fake.clone(),
            LibrarySearch::Redirect(PathBuf::from("/definitely/not/a/nvsmi/dir")),
        );
        lib.ensure_initialized();
        assert!(!lib.is_available());
        assert_eq!(fake.init_calls(), 0);
    }

    #[test]
    fn search_dir_guard_restores_cwd() {
        let before = std::env::current_dir().unwrap();
        {
            let _guard = SearchDirGuard::enter(&std::env::temp_dir()).unwrap();
        }
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn configured_search_dir_overrides_platform() {
        let config = LibraryConfig {
            search_dir: "/opt/nvidia/nvsmi".into(),
            ..Default::default()
        };
        let search = LibrarySearch::from_config(&config);
        assert!(search.requires_redirect());
        assert_eq!(search, LibrarySearch::Redirect(PathBuf::from("/opt/nvidia/nvsmi")));
    }

    #[cfg(not(windows))]
    #[test]
    fn unix_platforms_use_default_search_path() {
        assert!(!LibrarySearch::for_platform().requires_redirect());
    }
}
