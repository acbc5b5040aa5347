//! Scene harness: replay a recorded scene end to end and write the reports
//!
//! Replay -> change gate -> clarifying questions -> clinician answers ->
//! Markdown. Each run starts a fresh conversation (new gate, cleared question
//! memory); the harness itself can be reused across scenes.

use handoff_core::{Error, Observation, QuestionEntry, Record, Result, Snapshot};
use handoff_engine::{ChangeGate, ContextWindow, EngineConfig, FieldExtractor, QuestionGenerator, SignificanceOracle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocols::{ProtocolDoc, ProtocolLibrary};
use crate::report::{build_questions_markdown, build_report};
use crate::responder::{ClinicianDataStore, Responder};
use crate::scene::{load_scene, spawn_replay, ReplayOptions};

const CLINICIAN_DATA_FILE: &str = "clinician_data.yaml";
const CONTEXT_TOKEN_BUDGET: usize = 256;

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub replay: ReplayOptions,
    pub library_dir: PathBuf,
    pub registry_path: Option<PathBuf>,
    /// Where to dump the observation history as JSONL, if anywhere.
    pub history_path: Option<PathBuf>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            replay: ReplayOptions::default(),
            library_dir: PathBuf::from("data/emergencies"),
            registry_path: None,
            history_path: None,
        }
    }
}

#[derive(Debug)]
pub struct HarnessResult {
    pub run_id: Uuid,
    pub initial_record: Record,
    pub snapshots: Vec<Snapshot>,
    pub questions: Vec<QuestionEntry>,
    pub protocols: Vec<ProtocolDoc>,
    /// Scene lines that were rejected.
    pub skipped: Vec<Error>,
    pub observations: Vec<Observation>,
    /// Recent inputs plus compact summary at the end of the run.
    pub downstream_context: String,
    pub report_path: PathBuf,
    pub questions_path: PathBuf,
}

pub struct SceneHarness {
    config: EngineConfig,
    extractor: Arc<dyn FieldExtractor>,
    oracle: Arc<dyn SignificanceOracle>,
    questions: QuestionGenerator,
    responder: Option<Arc<dyn Responder>>,
    options: HarnessOptions,
}

impl SceneHarness {
    pub fn new(
        config: EngineConfig,
        extractor: Arc<dyn FieldExtractor>,
        oracle: Arc<dyn SignificanceOracle>,
    ) -> Self {
        let questions = QuestionGenerator::new(config.questions.clone());
        Self {
            config,
            extractor,
            oracle,
            questions,
            responder: None,
            options: HarnessOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HarnessOptions) -> Self {
        self.options = options;
        self
    }

    /// Answer questions with this responder instead of the scene's clinician data file.
    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub async fn run(&mut self, scene_path: &Path, report_path: &Path, questions_path: &Path) -> Result<HarnessResult> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Replaying scene {}", scene_path.display());

        let load = load_scene(scene_path)?;
        if !load.errors.is_empty() {
            warn!(%run_id, "{} scene lines skipped", load.errors.len());
        }

        let mut library = ProtocolLibrary::new(&self.options.library_dir);
        if let Some(registry) = &self.options.registry_path {
            library = library.with_registry(registry);
        }
        let protocols = library.load_for_scene(scene_path);
        debug!(%run_id, "{} protocols referenced", protocols.len());

        let responder = self.responder.clone().or_else(|| scene_responder(scene_path));
        self.questions.reset();

        let mut gate = ChangeGate::new(&self.config, self.extractor.clone(), self.oracle.clone());
        let initial_record = gate.record();
        let mut context = ContextWindow::new(CONTEXT_TOKEN_BUDGET);
        let mut snapshots = Vec::new();
        let mut questions: Vec<QuestionEntry> = Vec::new();
        // Answers run beside the stream and are attached once replay ends.
        let mut pending: Vec<(usize, JoinHandle<Option<String>>)> = Vec::new();
        let timeout = self.config.responder.timeout();

        let (mut rx, replay) = spawn_replay(load.events, self.options.replay);
        while let Some(event) = rx.recv().await {
            let snapshot = gate.process_event(&event).await;
            context.add_input(event.text(), gate.store());
            let Some(snapshot) = snapshot else { continue };

            for question in self.questions.generate(snapshot.record(), event.text(), &protocols) {
                if let Some(r) = &responder {
                    let task = spawn_answer(r.clone(), question.clone(), event.start_offset(), timeout);
                    pending.push((questions.len(), task));
                }
                questions.push(QuestionEntry::new(&snapshot, question));
            }
            snapshots.push(snapshot);
        }
        if let Err(e) = replay.await {
            warn!(%run_id, "Replay task ended abnormally: {}", e);
        }

        for (slot, task) in pending {
            match task.await {
                Ok(answer) => questions[slot].answer = answer,
                Err(e) => warn!(%run_id, "Responder task ended abnormally: {}", e),
            }
        }

        write_file(report_path, &build_report(&initial_record, &snapshots, &protocols))?;
        write_file(questions_path, &build_questions_markdown(&questions))?;
        if let Some(history_path) = &self.options.history_path {
            gate.store().write_history_jsonl(history_path)?;
        }

        info!(
            %run_id,
            snapshots = snapshots.len(),
            questions = questions.len(),
            "Scene complete"
        );

        Ok(HarnessResult {
            run_id,
            initial_record,
            snapshots,
            questions,
            protocols,
            skipped: load.errors,
            observations: gate.store().export_history().to_vec(),
            downstream_context: context.render(gate.store()),
            report_path: report_path.to_path_buf(),
            questions_path: questions_path.to_path_buf(),
        })
    }
}

/// Ask `responder` on its own task, bounded by `timeout`. Failures yield `None`.
fn spawn_answer(
    responder: Arc<dyn Responder>,
    question: String,
    event_time: f64,
    timeout: Duration,
) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        match tokio::time::timeout(timeout, responder.respond(&question, Some(event_time))).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(e)) => {
                warn!("Responder failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Responder timed out after {}ms", timeout.as_millis());
                None
            }
        }
    })
}

fn scene_responder(scene_path: &Path) -> Option<Arc<dyn Responder>> {
    let path = scene_path.with_file_name(CLINICIAN_DATA_FILE);
    if !path.exists() {
        return None;
    }
    match ClinicianDataStore::from_path(&path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
