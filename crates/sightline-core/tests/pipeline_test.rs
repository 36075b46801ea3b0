//! Integration tests for the narration pipeline
//!
//! Mock-driven: no camera hardware, vision API, or audio device required.
//! Timings use short intervals so the scheduling behavior is observable
//! without multi-second sleeps.

use sightline_core::{
    AnalysisClient, CameraProvider, EncodedFrame, NarrationMode, NarrationPipeline,
    NarrationSettings, PipelineConfig, PipelineEvent, PipelineSession, PlaceholderSpeech,
    SightError, SightResult, SpeechAction, SpeechDevice, SyntheticCamera, TriggerOrigin,
    VisionBackend, NORMAL_PITCH, URGENT_PITCH,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Vision backend with scripted per-call (delay, response) pairs, falling
/// back to an instant default. Tracks live/peak concurrency and every
/// instruction it was given.
struct ScriptedVision {
    script: Mutex<VecDeque<(Duration, String)>>,
    default_delay: Duration,
    default_text: String,
    live: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedVision {
    fn new(text: &str) -> Arc<Self> {
        Self::build(Vec::new(), Duration::ZERO, text)
    }

    /// Every call takes `delay` before answering.
    fn delayed(text: &str, delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), delay, text)
    }

    /// The first calls follow the script, later calls answer instantly.
    fn scripted(steps: &[(u64, &str)]) -> Arc<Self> {
        let script = steps
            .iter()
            .map(|(ms, text)| (Duration::from_millis(*ms), (*text).to_string()))
            .collect();
        Self::build(script, Duration::ZERO, "an unremarkable scene")
    }

    fn build(script: Vec<(Duration, String)>, default_delay: Duration, text: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            default_delay,
            default_text: text.to_string(),
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        })
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl VisionBackend for ScriptedVision {
    async fn describe_frame(&self, _frame: &EncodedFrame, instruction: &str) -> SightResult<String> {
        self.instructions
            .lock()
            .unwrap()
            .push(instruction.to_string());
        let current = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        let (delay, text) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((self.default_delay, self.default_text.clone()));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.live.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(text)
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        mode: NarrationMode::General,
        settings: NarrationSettings {
            auto_interval_ms: 60,
            ..Default::default()
        },
        settle_delay: Duration::from_millis(40),
    }
}

fn start_pipeline(
    vision: Arc<ScriptedVision>,
    camera: Arc<SyntheticCamera>,
    config: PipelineConfig,
) -> (PipelineSession, Arc<PlaceholderSpeech>) {
    let speaker = Arc::new(PlaceholderSpeech::new());
    let session = NarrationPipeline::new(camera, AnalysisClient::new(vision), speaker.clone())
        .with_config(config)
        .start();
    (session, speaker)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> PipelineEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for a pipeline event")
        .expect("event stream closed")
}

async fn next_narration(
    events: &mut mpsc::UnboundedReceiver<PipelineEvent>,
) -> (TriggerOrigin, sightline_core::NarrationResult) {
    loop {
        if let PipelineEvent::Narrated { origin, result } = next_event(events).await {
            return (origin, result);
        }
    }
}

async fn assert_no_narration_within(
    events: &mut mpsc::UnboundedReceiver<PipelineEvent>,
    window: Duration,
) {
    let narrated = timeout(window, async {
        loop {
            match events.recv().await {
                Some(PipelineEvent::Narrated { .. }) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;
    assert!(narrated.is_err(), "expected no narration in this window");
}

#[tokio::test]
async fn test_manual_narration_reaches_speech_and_transcript() {
    let vision = ScriptedVision::new("a red door two steps ahead");
    let camera = Arc::new(SyntheticCamera::new(64, 48));
    let (mut session, speaker) = start_pipeline(vision, camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    assert!(matches!(
        next_event(&mut session.events).await,
        PipelineEvent::CaptureStarted
    ));

    session.handle.narrate().await.expect("narrate failed");
    let (origin, result) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::Manual);
    assert_eq!(result.text, "a red door two steps ahead");

    let transcript = session.handle.transcript().await.expect("transcript failed");
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].text, "a red door two steps ahead");

    let spoken = speaker.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].pitch, NORMAL_PITCH);
    assert_eq!(spoken[0].rate, 1.0);

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_activation_failure_surfaces_reason_and_allows_retry() {
    let vision = ScriptedVision::new("unused");
    let camera = Arc::new(SyntheticCamera::unavailable("permission denied"));
    let (session, _speaker) = start_pipeline(vision, camera, fast_config());

    match session.handle.activate().await {
        Err(SightError::CameraUnavailable(reason)) => assert_eq!(reason, "permission denied"),
        other => panic!("expected CameraUnavailable, got {:?}", other),
    }

    // The pipeline survives the failure and can be asked again.
    let status = session.handle.status().await.expect("status failed");
    assert!(!status.active);
    assert!(session.handle.activate().await.is_err());

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_auto_ticks_are_single_flight() {
    let vision = ScriptedVision::delayed("the scene", Duration::from_millis(120));
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let mut config = fast_config();
    config.settings.auto_interval_ms = 30;
    let (session, _speaker) = start_pipeline(vision.clone(), camera, config);

    session.handle.activate().await.expect("activation failed");
    session
        .handle
        .set_auto_narration(true)
        .await
        .expect("toggle failed");

    tokio::time::sleep(Duration::from_millis(400)).await;
    session.handle.deactivate().await.expect("deactivate failed");

    assert_eq!(vision.peak(), 1, "auto analyses must never overlap");
    assert!(
        vision.calls() >= 2,
        "ticks should resume once the in-flight request clears"
    );

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_manual_trigger_overlaps_inflight_auto() {
    let vision = ScriptedVision::delayed("the scene", Duration::from_millis(150));
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, _speaker) = start_pipeline(vision.clone(), camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    session
        .handle
        .set_auto_narration(true)
        .await
        .expect("toggle failed");

    // Let the immediate auto tick get airborne, then fire a manual trigger.
    tokio::time::sleep(Duration::from_millis(30)).await;
    session.handle.narrate().await.expect("narrate failed");

    let (first, _) = next_narration(&mut session.events).await;
    let (second, _) = next_narration(&mut session.events).await;
    session.handle.deactivate().await.expect("deactivate failed");

    let mut origins = vec![first, second];
    origins.sort_by_key(|o| format!("{:?}", o));
    assert_eq!(origins, vec![TriggerOrigin::Auto, TriggerOrigin::Manual]);
    assert_eq!(vision.peak(), 2, "manual triggers bypass the auto gate");

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_toggling_auto_replaces_the_schedule() {
    let vision = ScriptedVision::new("the scene");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let mut config = fast_config();
    config.settings.auto_interval_ms = 100;
    let (mut session, _speaker) = start_pipeline(vision, camera, config);

    session.handle.activate().await.expect("activation failed");
    session.handle.set_auto_narration(true).await.unwrap();
    session.handle.set_auto_narration(false).await.unwrap();
    session.handle.set_auto_narration(true).await.unwrap();

    // One 100ms schedule over 350ms: the two immediate shots plus roughly
    // three ticks. A leaked second schedule would double the count.
    let mut narrations = 0usize;
    let _ = timeout(Duration::from_millis(350), async {
        loop {
            match session.events.recv().await {
                Some(PipelineEvent::Narrated { .. }) => narrations += 1,
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    assert!(
        (2..=6).contains(&narrations),
        "expected one active schedule, saw {} narrations",
        narrations
    );

    let status = session.handle.status().await.expect("status failed");
    assert!(status.auto_armed);

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_interval_change_snaps_to_offered_periods() {
    let vision = ScriptedVision::new("the scene");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (session, _speaker) = start_pipeline(vision, camera, fast_config());

    session.handle.set_auto_interval_ms(3000).await.unwrap();
    let status = session.handle.status().await.expect("status failed");
    assert_eq!(status.settings.auto_interval_ms, 2000);

    session.handle.set_auto_interval_ms(7500).await.unwrap();
    let status = session.handle.status().await.expect("status failed");
    assert_eq!(status.settings.auto_interval_ms, 8000);

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_mode_switch_fires_one_settled_narration() {
    let vision = ScriptedVision::new("described");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, _speaker) = start_pipeline(vision.clone(), camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    session.handle.set_mode(NarrationMode::Text).await.unwrap();

    let (origin, _) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::ModeSwitch);
    let instructions = vision.instructions();
    assert_eq!(instructions.len(), 1);
    assert!(instructions[0].contains("Read any visible text"));

    // A rapid second switch replaces the pending shot: only the latest
    // mode narrates.
    session.handle.set_mode(NarrationMode::Social).await.unwrap();
    session
        .handle
        .set_mode(NarrationMode::Navigation)
        .await
        .unwrap();

    let (origin, _) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::ModeSwitch);
    let instructions = vision.instructions();
    assert_eq!(instructions.len(), 2);
    assert!(instructions[1].contains("obstacles"));

    assert_no_narration_within(&mut session.events, Duration::from_millis(150)).await;

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_mode_switch_defers_to_auto_schedule() {
    let vision = ScriptedVision::new("described");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let mut config = fast_config();
    config.settings.auto_interval_ms = 10_000;
    let (mut session, _speaker) = start_pipeline(vision, camera, config);

    session.handle.activate().await.expect("activation failed");
    session.handle.set_auto_narration(true).await.unwrap();
    let (origin, _) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::Auto);

    // While the recurring schedule covers narration, switching modes does
    // not add a settle shot.
    session
        .handle
        .set_mode(NarrationMode::Shopping)
        .await
        .unwrap();
    assert_no_narration_within(&mut session.events, Duration::from_millis(150)).await;

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_warming_camera_skips_cycles_silently() {
    let vision = ScriptedVision::new("finally a frame");
    let camera = Arc::new(SyntheticCamera::new(32, 32).with_warmup(2));
    let (mut session, _speaker) = start_pipeline(vision.clone(), camera, fast_config());

    session.handle.activate().await.expect("activation failed");

    // First two triggers land during warm-up and are skipped, not errored.
    session.handle.narrate().await.unwrap();
    session.handle.narrate().await.unwrap();
    assert_no_narration_within(&mut session.events, Duration::from_millis(100)).await;
    assert_eq!(vision.calls(), 0);

    session.handle.narrate().await.unwrap();
    let (origin, result) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::Manual);
    assert_eq!(result.text, "finally a frame");

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_deactivation_releases_camera_but_keeps_inflight_result() {
    let vision = ScriptedVision::delayed("late arrival", Duration::from_millis(120));
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, speaker) = start_pipeline(vision, camera.clone(), fast_config());

    session.handle.activate().await.expect("activation failed");
    session.handle.narrate().await.expect("narrate failed");

    tokio::time::sleep(Duration::from_millis(20)).await;
    session.handle.deactivate().await.expect("deactivate failed");

    // Wait for the release, then reclaim the device from outside.
    loop {
        if let PipelineEvent::CaptureStopped = next_event(&mut session.events).await {
            break;
        }
    }
    let reclaimed = camera.open().expect("camera should be released after deactivation");
    drop(reclaimed);

    // The in-flight analysis still lands.
    let (origin, result) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::Manual);
    assert_eq!(result.text, "late arrival");
    assert_eq!(speaker.spoken().len(), 1);

    let transcript = session.handle.transcript().await.expect("transcript failed");
    assert_eq!(transcript.len(), 1);

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_shutdown_halts_speech_and_closes_events() {
    let vision = ScriptedVision::new("a quiet street");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, speaker) = start_pipeline(vision, camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    session.handle.narrate().await.expect("narrate failed");
    next_narration(&mut session.events).await;

    session.handle.shutdown().await.expect("shutdown failed");

    // Drain the stream; it must close once the task exits.
    let closed = timeout(Duration::from_secs(2), async {
        while session.events.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "event stream should close after shutdown");

    let actions = speaker.actions();
    assert_eq!(
        actions.last(),
        Some(&SpeechAction::CancelAll),
        "teardown must halt speech"
    );
    assert!(!speaker.is_speaking());
}

#[tokio::test]
async fn test_urgent_narration_interrupts_normal_speech() {
    let vision = ScriptedVision::scripted(&[(0, "a calm hallway"), (0, "WARNING: wet floor ahead")]);
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, speaker) = start_pipeline(vision, camera, fast_config());

    session.handle.activate().await.expect("activation failed");

    session.handle.narrate().await.unwrap();
    let (_, first) = next_narration(&mut session.events).await;
    assert_eq!(first.text, "a calm hallway");

    session.handle.narrate().await.unwrap();
    let (_, second) = next_narration(&mut session.events).await;
    assert!(second.text.starts_with("WARNING"));

    let actions = speaker.actions();
    assert_eq!(actions.len(), 3);
    assert!(matches!(actions[0], SpeechAction::Enqueue(_)));
    assert_eq!(actions[1], SpeechAction::CancelAll);
    match &actions[2] {
        SpeechAction::Enqueue(utterance) => {
            assert_eq!(utterance.pitch, URGENT_PITCH);
            assert!(utterance.text.starts_with("WARNING"));
        }
        other => panic!("expected the urgent utterance, got {:?}", other),
    }

    let transcript = session.handle.transcript().await.expect("transcript failed");
    assert_eq!(transcript[0].text, "WARNING: wet floor ahead");
    assert_eq!(transcript[1].text, "a calm hallway");

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_racing_results_apply_in_completion_order() {
    let vision = ScriptedVision::scripted(&[(150, "slow scene"), (10, "fast scene")]);
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, _speaker) = start_pipeline(vision.clone(), camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    session.handle.narrate().await.unwrap();
    session.handle.narrate().await.unwrap();

    let (_, first) = next_narration(&mut session.events).await;
    let (_, second) = next_narration(&mut session.events).await;
    assert_eq!(first.text, "fast scene");
    assert_eq!(second.text, "slow scene");
    assert_eq!(vision.peak(), 2, "both manual requests should run together");

    let transcript = session.handle.transcript().await.expect("transcript failed");
    assert_eq!(transcript[0].text, "slow scene");
    assert_eq!(transcript[1].text, "fast scene");

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_empty_narration_is_logged_but_not_spoken() {
    let vision = ScriptedVision::new("");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, speaker) = start_pipeline(vision, camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    session.handle.narrate().await.unwrap();

    let (_, result) = next_narration(&mut session.events).await;
    assert!(result.text.is_empty());
    assert!(speaker.actions().is_empty(), "empty text must not reach the device");

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_auto_ticks_recover_after_warmup_skips() {
    let vision = ScriptedVision::new("warmed up");
    let camera = Arc::new(SyntheticCamera::new(32, 32).with_warmup(2));
    let mut config = fast_config();
    config.settings.auto_interval_ms = 30;
    let (mut session, _speaker) = start_pipeline(vision, camera, config);

    session.handle.activate().await.expect("activation failed");
    session.handle.set_auto_narration(true).await.unwrap();

    // The first two ticks land during warm-up. Each skipped cycle must
    // release the gate, or no later tick could ever narrate.
    let (origin, result) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::Auto);
    assert_eq!(result.text, "warmed up");

    let status = session.handle.status().await.expect("status failed");
    assert!(status.auto_armed);

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_pipeline_transcript_keeps_ten_newest() {
    let script: Vec<(Duration, String)> = (1..=12)
        .map(|i| (Duration::ZERO, format!("scene {}", i)))
        .collect();
    let vision = ScriptedVision::build(script, Duration::ZERO, "spare scene");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let (mut session, _speaker) = start_pipeline(vision, camera, fast_config());

    session.handle.activate().await.expect("activation failed");
    for _ in 0..12 {
        session.handle.narrate().await.unwrap();
        next_narration(&mut session.events).await;
    }

    let transcript = session.handle.transcript().await.expect("transcript failed");
    assert_eq!(transcript.len(), 10);
    assert_eq!(transcript[0].text, "scene 12");
    assert_eq!(transcript[9].text, "scene 3");
    assert!(transcript.iter().all(|r| r.text != "scene 1" && r.text != "scene 2"));

    session.handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
async fn test_interval_change_rearms_one_schedule() {
    let vision = ScriptedVision::new("the scene");
    let camera = Arc::new(SyntheticCamera::new(32, 32));
    let mut config = fast_config();
    config.settings.auto_interval_ms = 10_000;
    let (mut session, _speaker) = start_pipeline(vision, camera, config);

    session.handle.activate().await.expect("activation failed");
    session.handle.set_auto_narration(true).await.unwrap();
    let (origin, _) = next_narration(&mut session.events).await;
    assert_eq!(origin, TriggerOrigin::Auto);

    // An interval change while armed replaces the schedule: one immediate
    // tick on the fresh interval, then nothing until the new period elapses.
    session.handle.set_auto_interval_ms(3000).await.unwrap();
    let mut narrations = 0usize;
    let _ = timeout(Duration::from_millis(400), async {
        loop {
            match session.events.recv().await {
                Some(PipelineEvent::Narrated { .. }) => narrations += 1,
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    assert_eq!(narrations, 1, "expected only the immediate re-arm tick");

    let status = session.handle.status().await.expect("status failed");
    assert!(status.auto_armed);
    assert_eq!(status.settings.auto_interval_ms, 2000);

    session.handle.shutdown().await.expect("shutdown failed");
}
