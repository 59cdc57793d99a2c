//! Configuration loading: include graphs, environment expansion and the
//! two forms of `next`.

use euphio::config::Config;
use std::fs;

#[tokio::test]
async fn includes_load_first_and_includer_wins() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();

    fs::write(
        dir.path().join("config/base.yml"),
        "general:\n  boardName: from-include\n  hostname: bbs.example.com\nviews:\n  welcome:\n    art: welcome\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.yml"),
        "include:\n  - config/base.yml\ngeneral:\n  boardName: overridden\n",
    )
    .unwrap();

    let config = Config::load(dir.path().join("main.yml").to_str().unwrap())
        .await
        .unwrap();

    // The including file's keys override, untouched keys survive.
    assert_eq!(config.general.board_name, "overridden");
    assert_eq!(config.general.hostname, "bbs.example.com");
    assert!(config.views.contains_key("welcome"));

    // Both canonical paths are tracked for the watcher.
    assert_eq!(config.loaded_files.len(), 2);
}

#[tokio::test]
async fn each_file_loads_once_despite_cycles() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.yml"),
        "include: [b.yml]\ngeneral:\n  boardName: a\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("b.yml"),
        "include: [a.yml]\ngeneral:\n  description: from-b\n",
    )
    .unwrap();

    let config = Config::load(dir.path().join("a.yml").to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(config.general.board_name, "a");
    assert_eq!(config.general.description, "from-b");
    assert_eq!(config.loaded_files.len(), 2);
}

#[tokio::test]
async fn environment_variables_expand_before_parse() {
    std::env::set_var("EUPHIO_IT_PORT", "4545");
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("env.yml"),
        "listeners:\n  telnet:\n    enabled: true\n    port: $EUPHIO_IT_PORT\n",
    )
    .unwrap();

    let config = Config::load(dir.path().join("env.yml").to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(config.listeners.telnet.port, 4545);
}

#[tokio::test]
async fn next_forms_parse_from_full_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("views.yml"),
        r#"views:
  splash:
    next:
      view: menu
      delay: 1500
  pause_gate:
    next: menu
"#,
    )
    .unwrap();

    let config = Config::load(dir.path().join("views.yml").to_str().unwrap())
        .await
        .unwrap();

    let splash = config.views["splash"].next.as_ref().unwrap();
    assert_eq!(splash.view(), "menu");
    assert_eq!(splash.delay_ms(), 1500);

    let gate = config.views["pause_gate"].next.as_ref().unwrap();
    assert_eq!(gate.view(), "menu");
    assert_eq!(gate.delay_ms(), 0);
}

#[tokio::test]
async fn missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/euphio.yml").await.is_err());
}
