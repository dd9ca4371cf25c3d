//! Model lifecycle against the single shared model slot.
//!
//! Exactly one model is loaded per process. The loaded engine is replaced, never
//! mutated in place: a reload fully constructs the new engine before the old one is
//! discarded. Callers serialize access externally (see [`crate::Transcriber`], which
//! holds the manager behind a mutex).

use std::path::PathBuf;

use tracing::{info, warn};

use crate::artifacts::ModelArtifacts;
use crate::config::{AUTO_DEVICE_ID, Provider, RecognizerConfig};
use crate::engine::RecognizerFactory;
use crate::error::{Error, Result};
use crate::probe::{PROBE_DEVICE_ORDER, probe_accelerator};

/// Device label reported after a load failure left the slot empty.
const ERROR_LABEL: &str = "Error";

/// Device label before the first load.
const UNLOADED_LABEL: &str = "unloaded";

/// The process-wide model slot: the loaded engine plus the config it was built with.
struct ModelState<E> {
    engine: E,
    config: RecognizerConfig,
}

/// Owns the single loaded recognizer instance and its configuration.
pub struct ModelManager<F: RecognizerFactory> {
    factory: F,
    models_dir: PathBuf,
    state: Option<ModelState<F::Engine>>,
    device_label: String,
}

impl<F: RecognizerFactory> ModelManager<F> {
    pub fn new(factory: F, models_dir: PathBuf) -> Self {
        Self {
            factory,
            models_dir,
            state: None,
            device_label: UNLOADED_LABEL.to_owned(),
        }
    }

    /// Load (or reload) the model for the given request parameters.
    ///
    /// When acceleration is requested we first resolve a device id — probing the
    /// canonical candidate order when the caller passed [`AUTO_DEVICE_ID`] — and attempt
    /// an accelerated build. Any accelerated construction failure falls back
    /// transparently to CPU; the resulting device label records what actually happened.
    ///
    /// On success the slot is replaced atomically (new engine fully constructed first).
    /// On failure any prior state stays intact; if the slot was already empty, the
    /// device label becomes an error marker until the next successful load.
    pub fn load(
        &mut self,
        use_acceleration: bool,
        device_id: i32,
        thread_count: usize,
    ) -> Result<&str> {
        let artifacts = ModelArtifacts::resolve(&self.models_dir).inspect_err(|err| {
            warn!(error = %err, "model artifact check failed");
            if self.state.is_none() {
                self.device_label = ERROR_LABEL.to_owned();
            }
        })?;

        info!(
            weights = %artifacts.weights.display(),
            quantized = artifacts.quantized,
            use_acceleration,
            "loading model"
        );

        if use_acceleration {
            let resolved = if device_id == AUTO_DEVICE_ID {
                probe_accelerator(&self.factory, &artifacts, &PROBE_DEVICE_ORDER)
            } else {
                Some(device_id)
            };

            if let Some(accel_device) = resolved {
                let mut config = RecognizerConfig::accelerated(accel_device, thread_count);
                match self.factory.build(&artifacts, &config) {
                    Ok(engine) => {
                        self.install(engine, config);
                        return Ok(&self.device_label);
                    }
                    Err(err) => {
                        warn!(
                            device_id = accel_device,
                            error = %err,
                            "accelerated load failed, falling back to CPU"
                        );
                        // Remember the accelerated request so reconciliation doesn't
                        // rebuild (and re-fail) on every subsequent call.
                        config.provider = Provider::Cpu;
                        return self.load_cpu(&artifacts, config);
                    }
                }
            }

            // Probing found nothing usable; record the request, run on CPU.
            let mut config = RecognizerConfig::accelerated(AUTO_DEVICE_ID, thread_count);
            config.provider = Provider::Cpu;
            return self.load_cpu(&artifacts, config);
        }

        self.load_cpu(&artifacts, RecognizerConfig::cpu(thread_count))
    }

    fn load_cpu(&mut self, artifacts: &ModelArtifacts, config: RecognizerConfig) -> Result<&str> {
        match self.factory.build(artifacts, &config) {
            Ok(engine) => {
                self.install(engine, config);
                Ok(&self.device_label)
            }
            Err(err) => {
                if self.state.is_none() {
                    self.device_label = ERROR_LABEL.to_owned();
                }
                Err(Error::ModelLoad(err.to_string()))
            }
        }
    }

    fn install(&mut self, engine: F::Engine, config: RecognizerConfig) {
        self.device_label = config.provider.device_label().to_owned();
        // Replacing the Option drops the previous engine only after the new one exists.
        self.state = Some(ModelState { engine, config });
        info!(device = %self.device_label, "model loaded");
    }

    /// Drop the loaded model, leaving the slot empty until the next load.
    pub fn unload(&mut self) {
        if self.state.take().is_some() {
            info!("model unloaded");
        }
        self.device_label = UNLOADED_LABEL.to_owned();
    }

    /// The config of the currently loaded model, if any.
    pub fn current_config(&self) -> Option<&RecognizerConfig> {
        self.state.as_ref().map(|s| &s.config)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Human-readable label of the device the model runs on (or an error/unloaded
    /// marker).
    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    /// Mutable access to the loaded engine for recognition.
    pub fn engine_mut(&mut self) -> Option<&mut F::Engine> {
        self.state.as_mut().map(|s| &mut s.engine)
    }

    pub fn models_dir(&self) -> &std::path::Path {
        &self.models_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{TOKENS_FILE, WEIGHTS_FILE};
    use crate::engine::RecognizerEngine;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    struct NullEngine;

    impl RecognizerEngine for NullEngine {
        fn recognize(&mut self, _sample_rate: u32, _samples: &[f32]) -> Result<String> {
            Ok(String::new())
        }
    }

    /// Records every build attempt; fails for configs the test marked unbuildable.
    struct ScriptedFactory {
        builds: Rc<RefCell<Vec<RecognizerConfig>>>,
        fail_accelerated: bool,
        fail_cpu: bool,
    }

    impl ScriptedFactory {
        fn new(fail_accelerated: bool, fail_cpu: bool) -> Self {
            Self {
                builds: Rc::new(RefCell::new(Vec::new())),
                fail_accelerated,
                fail_cpu,
            }
        }
    }

    impl RecognizerFactory for ScriptedFactory {
        type Engine = NullEngine;

        fn build(
            &self,
            _artifacts: &ModelArtifacts,
            config: &RecognizerConfig,
        ) -> Result<Self::Engine> {
            self.builds.borrow_mut().push(*config);
            let fail = match config.provider {
                Provider::Accelerated => self.fail_accelerated,
                Provider::Cpu => self.fail_cpu,
            };
            if fail {
                Err(Error::Recognition("construction failed".into()))
            } else {
                Ok(NullEngine)
            }
        }
    }

    fn models_dir_with_artifacts() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        write_stub(dir.path(), WEIGHTS_FILE);
        write_stub(dir.path(), TOKENS_FILE);
        dir
    }

    fn write_stub(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"stub").expect("write stub");
    }

    #[test]
    fn cpu_load_installs_model_with_cpu_label() -> anyhow::Result<()> {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(false, false);
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        let label = manager.load(false, AUTO_DEVICE_ID, 4)?.to_owned();
        assert_eq!(label, "CPU");
        assert!(manager.is_loaded());
        assert_eq!(manager.current_config().map(|c| c.thread_count), Some(4));
        Ok(())
    }

    #[test]
    fn accelerated_load_records_accelerated_label() -> anyhow::Result<()> {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(false, false);
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        let label = manager.load(true, 0, 4)?.to_owned();
        assert_eq!(label, "Accelerated (GPU)");

        let config = manager.current_config().expect("loaded config");
        assert!(config.use_acceleration);
        assert_eq!(config.device_id, 0);
        assert_eq!(config.provider, Provider::Accelerated);
        Ok(())
    }

    #[test]
    fn accelerated_failure_falls_back_to_cpu() -> anyhow::Result<()> {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(true, false);
        let builds = factory.builds.clone();
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        let label = manager.load(true, 0, 4)?.to_owned();
        assert_eq!(label, "CPU");

        // The fallback config remembers that acceleration was requested.
        let config = manager.current_config().expect("loaded config");
        assert!(config.use_acceleration);
        assert_eq!(config.provider, Provider::Cpu);

        // One accelerated attempt, one CPU attempt.
        assert_eq!(builds.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn auto_device_id_probes_canonical_order() -> anyhow::Result<()> {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(false, false);
        let builds = factory.builds.clone();
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        manager.load(true, AUTO_DEVICE_ID, 4)?;

        // Probe hits device 1 first and succeeds, then the real build reuses it.
        let recorded = builds.borrow();
        assert_eq!(recorded[0].device_id, 1);
        assert_eq!(recorded[0].thread_count, 1);
        assert_eq!(recorded[1].device_id, 1);
        assert_eq!(recorded[1].thread_count, 4);
        Ok(())
    }

    #[test]
    fn missing_artifacts_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let factory = ScriptedFactory::new(false, false);
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        let err = manager.load(false, AUTO_DEVICE_ID, 4).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!manager.is_loaded());
        assert_eq!(manager.device_label(), "Error");
    }

    #[test]
    fn total_failure_leaves_slot_empty_with_error_marker() {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(true, true);
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        let err = manager.load(true, 0, 4).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(!manager.is_loaded());
        assert_eq!(manager.device_label(), "Error");
    }

    #[test]
    fn failed_reload_keeps_prior_model() -> anyhow::Result<()> {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(true, false);
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        manager.load(false, AUTO_DEVICE_ID, 4)?;
        assert!(manager.is_loaded());

        // Delete the weights so the next load fails at the artifact check.
        std::fs::remove_file(dir.path().join(WEIGHTS_FILE))?;
        assert!(manager.load(false, AUTO_DEVICE_ID, 8).is_err());

        // The previously loaded model survives.
        assert!(manager.is_loaded());
        assert_eq!(manager.current_config().map(|c| c.thread_count), Some(4));
        assert_eq!(manager.device_label(), "CPU");
        Ok(())
    }

    #[test]
    fn unload_clears_the_slot() -> anyhow::Result<()> {
        let dir = models_dir_with_artifacts();
        let factory = ScriptedFactory::new(false, false);
        let mut manager = ModelManager::new(factory, dir.path().to_path_buf());

        manager.load(false, AUTO_DEVICE_ID, 4)?;
        manager.unload();

        assert!(!manager.is_loaded());
        assert!(manager.current_config().is_none());
        assert_eq!(manager.device_label(), "unloaded");
        Ok(())
    }
}
