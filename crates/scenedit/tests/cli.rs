use std::fs;
use std::process::Command;

use tempfile::TempDir;

const VALID_CONFIG: &str = "# Object Settings:
object.rotation:
  axis = \"y\"
  speed = 0.01
  direction = -1
  isRotating = true
object:
  scale = [1, 1, 1]
  position = [0, 0, 0]
camera:
  fov = 60
  position = [0, -3, 1]
";

fn scenedit() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_scenedit"));
    command.env("RUST_LOG", "warn");
    command
}

#[test]
fn config_fmt_prints_canonical_text() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scene.txt");
    fs::write(&path, format!("{VALID_CONFIG}  not a line\n")).unwrap();

    let output = scenedit()
        .args(["config", "fmt"])
        .arg(&path)
        .output()
        .expect("failed to run scenedit config fmt");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("# Object Settings:"));
    assert!(stdout.contains("axis = \"y\""));
    assert!(stdout.contains("fov = 60"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("warning: line"));
}

#[test]
fn config_check_rejects_partial_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.txt");
    fs::write(&path, "object.rotation:\n  speed = 0.5\n").unwrap();

    let status = scenedit()
        .args(["config", "check"])
        .arg(&path)
        .status()
        .expect("failed to run scenedit config check");
    assert!(!status.success());

    fs::write(&path, VALID_CONFIG).unwrap();
    let status = scenedit()
        .args(["config", "check"])
        .arg(&path)
        .status()
        .expect("failed to rerun scenedit config check");
    assert!(status.success());
}

#[test]
fn shader_check_reports_user_line() {
    let dir = TempDir::new().unwrap();
    let fragment = dir.path().join("broken.frag");
    fs::write(
        &fragment,
        "layout(location = 0) in vec2 vUv;\nlayout(location = 0) out vec4 fragColor;\nvoid main() { fragColor = vec4(vUv, 0.0) }\n",
    )
    .unwrap();

    let output = scenedit()
        .args(["shader", "check", "--fragment"])
        .arg(&fragment)
        .output()
        .expect("failed to run scenedit shader check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fragment shader error"), "{stderr}");
    assert!(stderr.contains("Line 3"), "{stderr}");
}

#[test]
fn shader_check_accepts_defaults_and_mappings() {
    let output = scenedit()
        .args(["shader", "check"])
        .output()
        .expect("failed to run scenedit shader check");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Shader compiled successfully"));

    let status = scenedit()
        .args(["shader", "check", "--mapping", "cube-reflection"])
        .status()
        .expect("failed to run scenedit shader check --mapping");
    assert!(status.success());
}

#[test]
fn shader_check_needs_bound_sampler() {
    let dir = TempDir::new().unwrap();
    let fragment = dir.path().join("sampled.frag");
    fs::write(
        &fragment,
        "layout(location = 0) in vec2 vUv;\nlayout(location = 0) out vec4 fragColor;\nvoid main() { fragColor = texture(u_map, vUv); }\n",
    )
    .unwrap();

    let unbound = scenedit()
        .args(["shader", "check", "--fragment"])
        .arg(&fragment)
        .status()
        .expect("failed to run scenedit shader check");
    assert!(!unbound.success());

    let bound = scenedit()
        .args(["shader", "check", "--slot", "map", "--fragment"])
        .arg(&fragment)
        .status()
        .expect("failed to rerun scenedit shader check");
    assert!(bound.success());
}
