//! Backend fallback through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nightstand_speaks::{
    BackendKind, BackendPreference, EngineFactory, InitCallback, InitStatus, LanguageAvailability,
    ModelLoader, PlatformConnector, PlatformSpeech, QueueMode, SherpaLoader, SpeechConfig,
    SpeechError, SpeechManager, UtteranceParams,
};

#[derive(Default)]
struct RecordingPlatform {
    utterances: Mutex<Vec<String>>,
    shutdowns: AtomicUsize,
}

impl PlatformSpeech for RecordingPlatform {
    fn connect(&self, on_ready: InitCallback) {
        std::thread::spawn(move || on_ready(InitStatus::Success));
    }

    fn set_language(&self, _locale: &str) -> LanguageAvailability {
        LanguageAvailability::Available
    }

    fn speak(&self, text: &str, mode: QueueMode, _params: &UtteranceParams) -> Result<(), SpeechError> {
        assert_eq!(mode, QueueMode::Flush);
        self.utterances.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn stop(&self) {}

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn manager(preference: BackendPreference) -> (SpeechManager, Arc<RecordingPlatform>) {
    let platform = Arc::new(RecordingPlatform::default());
    let connector: PlatformConnector = {
        let platform = Arc::clone(&platform);
        Arc::new(move || Arc::clone(&platform) as Arc<dyn PlatformSpeech>)
    };
    let loader: Arc<dyn ModelLoader> = Arc::new(SherpaLoader::new(None));
    let factory = EngineFactory::new(SpeechConfig::default(), loader, None, connector);
    (SpeechManager::new(factory, preference), platform)
}

#[tokio::test]
async fn unbundled_model_falls_back_to_platform() {
    let (manager, platform) = manager(BackendPreference::Auto);

    manager.speak("You have 2 to-do items.").await.unwrap();
    manager.speak("Your to-do list is empty.").await.unwrap();

    assert_eq!(manager.active_backend(), BackendKind::PlatformFallback);
    assert_eq!(
        *platform.utterances.lock().unwrap(),
        vec!["You have 2 to-do items.", "Your to-do list is empty."]
    );
}

#[tokio::test]
async fn offline_only_reports_missing_model() {
    let (manager, platform) = manager(BackendPreference::PreferredOnly);

    let err = manager.speak("hello").await.unwrap_err();
    assert!(matches!(err, SpeechError::UnsupportedOperation { .. }));
    assert!(platform.utterances.lock().unwrap().is_empty());
}

#[tokio::test]
async fn switching_preference_replaces_engine() {
    let (manager, platform) = manager(BackendPreference::Auto);
    manager.speak("first").await.unwrap();

    manager
        .update_preference(BackendPreference::PreferredOnly)
        .await;
    assert_eq!(manager.active_backend(), BackendKind::None);
    assert_eq!(platform.shutdowns.load(Ordering::SeqCst), 1);

    manager
        .update_preference(BackendPreference::FallbackOnly)
        .await;
    manager.speak("second").await.unwrap();
    assert_eq!(manager.active_backend(), BackendKind::PlatformFallback);

    manager.close().await;
    assert_eq!(platform.shutdowns.load(Ordering::SeqCst), 2);
}
