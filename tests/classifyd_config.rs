use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use live_classifier::config::ClassifierdConfig;
use live_classifier::{
    ChannelOrder, ElementType, FlashMode, FocusPoint, Orientation, PixelFormat, ResizePolicy,
    ScoreKind, TensorLayout,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CLASSIFIER_CONFIG",
        "CLASSIFIER_DEVICE",
        "CLASSIFIER_FPS",
        "CLASSIFIER_MODEL",
        "CLASSIFIER_LABELS",
        "CLASSIFIER_RESIZE_POLICY",
        "CLASSIFIER_ORIENTATION",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_run_the_synthetic_camera() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ClassifierdConfig::load().expect("load defaults");

    assert_eq!(cfg.capture.device, "stub://camera");
    assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
    assert_eq!(cfg.capture.fps, 30);
    assert_eq!(cfg.model.location, "stub://dominant-color");
    assert_eq!(cfg.model.input.size, 224);
    assert_eq!(cfg.resize_policy, ResizePolicy::Stretch);
    assert_eq!(cfg.controls.focus_point, None);
    assert_eq!(cfg.diagnostics.top_k, 3);
    assert_eq!(cfg.diagnostics.stats_interval.as_secs(), 5);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "capture": {
                "device": "/dev/video2",
                "width": 1280,
                "height": 720,
                "fps": 24,
                "orientation": "90",
                "pixel_format": "mjpeg"
            },
            "model": {
                "location": "/opt/models/mobilenet.onnx",
                "labels": "/opt/models/labels.txt",
                "input_size": 299,
                "channel_order": "bgr",
                "layout": "nhwc",
                "element": "f32",
                "mean": [0.485, 0.456, 0.406],
                "std": [0.229, 0.224, 0.225],
                "scores": "logits"
            },
            "resize_policy": "aspect_fill",
            "controls": {
                "focus_point": [0.5, 1.4],
                "flash": "auto"
            },
            "diagnostics": {
                "top_k": 5,
                "stats_interval_secs": 10
            }
        }"#,
    );

    std::env::set_var("CLASSIFIER_CONFIG", file.path());
    std::env::set_var("CLASSIFIER_FPS", "15");
    std::env::set_var("CLASSIFIER_RESIZE_POLICY", "letterbox");

    let cfg = ClassifierdConfig::load().expect("load config");

    assert_eq!(cfg.capture.device, "/dev/video2");
    assert_eq!((cfg.capture.width, cfg.capture.height), (1280, 720));
    assert_eq!(cfg.capture.fps, 15);
    assert_eq!(cfg.capture.orientation, Orientation::Rotate90);
    assert_eq!(cfg.capture.pixel_format, PixelFormat::Mjpeg);
    assert_eq!(cfg.model.location, "/opt/models/mobilenet.onnx");
    assert_eq!(cfg.model.labels, Some(PathBuf::from("/opt/models/labels.txt")));
    assert_eq!(cfg.model.input.size, 299);
    assert_eq!(cfg.model.input.channel_order, ChannelOrder::Bgr);
    assert_eq!(cfg.model.input.layout, TensorLayout::Nhwc);
    assert_eq!(
        cfg.model.input.element,
        ElementType::F32 {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    );
    assert_eq!(cfg.model.scores, ScoreKind::Logits);
    assert_eq!(cfg.resize_policy, ResizePolicy::AspectFit);
    assert_eq!(cfg.controls.focus_point, Some(FocusPoint::new(0.5, 1.0)));
    assert_eq!(cfg.controls.flash, Some(FlashMode::Auto));
    assert_eq!(cfg.diagnostics.top_k, 5);
    assert_eq!(cfg.diagnostics.stats_interval.as_secs(), 10);

    clear_env();
}

#[test]
fn env_overrides_device_model_and_orientation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CLASSIFIER_DEVICE", "stub://solid/255,0,0");
    std::env::set_var("CLASSIFIER_MODEL", "stub://fixed/cat");
    std::env::set_var("CLASSIFIER_LABELS", "/tmp/labels.txt");
    std::env::set_var("CLASSIFIER_ORIENTATION", "270");

    let cfg = ClassifierdConfig::load().expect("load config");

    assert_eq!(cfg.capture.device, "stub://solid/255,0,0");
    assert_eq!(cfg.model.location, "stub://fixed/cat");
    assert_eq!(cfg.model.labels, Some(PathBuf::from("/tmp/labels.txt")));
    assert_eq!(cfg.capture.orientation, Orientation::Rotate270);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    for json in [
        r#"{ "capture": { "width": 0 } }"#,
        r#"{ "model": { "input_size": 0 } }"#,
        r#"{ "model": { "std": [0.2, 0.0, 0.2] } }"#,
        r#"{ "model": { "element": "f16" } }"#,
        r#"{ "resize_policy": "zoom" }"#,
        r#"{ "controls": { "flash": "strobe" } }"#,
        r#"{ "diagnostics": { "stats_interval_secs": 0 } }"#,
        r#"{ "capture": "#,
    ] {
        clear_env();
        let file = write_config(json);
        std::env::set_var("CLASSIFIER_CONFIG", file.path());
        assert!(ClassifierdConfig::load().is_err(), "accepted {json}");
    }

    clear_env();
    std::env::set_var("CLASSIFIER_FPS", "fast");
    assert!(ClassifierdConfig::load().is_err());

    clear_env();
}
