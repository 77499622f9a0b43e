use super::*;
use tempfile::TempDir;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }
}

use test_helpers::parse_args;

#[test]
fn bare_invocation_defaults_to_chat() {
    let args = parse_args(&["confab"]);
    assert!(args.command.is_none());
    assert!(args.config.is_none());
    assert!(!args.log_json);
}

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let argv = [
        "confab",
        "chat",
        "--endpoint",
        "wss://chat.example.com/ws",
        "--max-reconnect-attempts",
        "2",
        "--log-json",
        "--context",
        r#"{"user_input":"Hi"}"#,
    ];
    let args = parse_args(&argv);
    assert_eq!(args.endpoint.as_deref(), Some("wss://chat.example.com/ws"));
    assert_eq!(args.max_reconnect_attempts, Some(2));
    assert!(args.log_json);
    match args.command {
        Some(Commands::Chat { context }) => {
            assert_eq!(context.as_deref(), Some(r#"{"user_input":"Hi"}"#))
        }
        _ => panic!("expected chat subcommand for argv={argv:?}"),
    }
}

#[test]
fn prime_requires_context() {
    assert!(Args::try_parse_from(["confab", "prime"]).is_err());
    let args = parse_args(&["confab", "prime", "--context", "{}"]);
    assert!(matches!(args.command, Some(Commands::Prime { context }) if context == "{}"));
}

#[test]
fn config_subcommands_parse() {
    let args = parse_args(&["confab", "-c", "/tmp/confab.toml", "config", "init", "--force"]);
    assert_eq!(args.config, Some(PathBuf::from("/tmp/confab.toml")));
    assert!(matches!(
        args.command,
        Some(Commands::Config {
            command: ConfigCommands::Init { force: true }
        })
    ));
    assert!(matches!(
        parse_args(&["confab", "config", "show"]).command,
        Some(Commands::Config {
            command: ConfigCommands::Show
        })
    ));
}

#[test]
fn context_must_be_json() {
    assert_eq!(
        parse_context(r#"{"user_input":"Hi"}"#).unwrap()["user_input"],
        "Hi"
    );
    let err = parse_context("{not json").unwrap_err();
    assert!(err.to_string().starts_with("--context is not valid JSON"));
}

#[test]
fn init_config_refuses_to_overwrite_without_force() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.toml");
    let config = Config::with_defaults();

    init_config(&config, &path, false).expect("first init succeeds");
    assert!(init_config(&config, &path, false).is_err());

    let custom = Config {
        endpoint: Some("wss://chat.example.com/ws".to_string()),
        ..Config::with_defaults()
    };
    init_config(&custom, &path, true).expect("forced init succeeds");
    let written = Config::load_from_path(&path).expect("load failed");
    assert_eq!(written.endpoint(), "wss://chat.example.com/ws");
    assert_eq!(written.max_reconnect_attempts, Some(5));
}

#[test]
fn init_config_rejects_unusable_values() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.toml");
    let config = Config {
        endpoint: Some("http://not-a-websocket".to_string()),
        ..Config::with_defaults()
    };
    assert!(init_config(&config, &path, false).is_err());
    assert!(!path.exists());
}

#[test]
fn load_config_applies_flag_overrides() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "endpoint = \"ws://file.example/ws\"\nmax_reconnect_attempts = 9\n")
        .expect("write failed");

    let config = load_config(&path, None, Some(3)).expect("load failed");
    assert_eq!(config.endpoint(), "ws://file.example/ws");
    assert_eq!(config.max_reconnect_attempts, Some(3));
}
