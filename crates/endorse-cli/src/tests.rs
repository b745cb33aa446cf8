use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["endorse-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["endorse-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["endorse-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn history_show_requires_user() {
    assert!(Cli::try_parse_from(["endorse-cli", "history", "show"]).is_err());

    let cli = Cli::try_parse_from(["endorse-cli", "history", "show", "--user", "u-1"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::History {
            command: HistoryCommands::Show { ref user, json: false }
        }) if user == "u-1"
    ));
}

#[test]
fn history_verify_defaults_to_all() {
    let cli = Cli::try_parse_from(["endorse-cli", "history", "verify"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::History {
            command: HistoryCommands::Verify { history_id: None }
        })
    ));
}

#[test]
fn history_verify_rejects_malformed_id() {
    let result =
        Cli::try_parse_from(["endorse-cli", "history", "verify", "--history-id", "not-a-uuid"]);
    assert!(result.is_err());
}

#[test]
fn admin_backdate_parses_entity_type_and_defaults_position() {
    let cli = Cli::try_parse_from([
        "endorse-cli",
        "admin",
        "backdate",
        "--user",
        "u-1",
        "--entity-type",
        "place",
        "--entity-id",
        "cafe-9",
        "--entity-name",
        "Corner Cafe",
        "--start",
        "2024-01-01",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Admin {
            command: AdminCommands::Backdate {
                entity_type: endorse_core::EntityType::Place,
                end: None,
                position: 1,
                ..
            }
        })
    ));
}

#[test]
fn admin_backdate_rejects_unknown_entity_type() {
    let result = Cli::try_parse_from([
        "endorse-cli",
        "admin",
        "backdate",
        "--user",
        "u-1",
        "--entity-type",
        "person",
        "--entity-id",
        "x",
        "--entity-name",
        "X",
        "--start",
        "2024-01-01",
    ]);
    assert!(result.is_err());
}

#[test]
fn admin_overwrite_totals_accepts_partial_override() {
    let id = "7f1c1f9e-2a4b-4c1d-9d62-0d7f3c1e5a10";
    let cli = Cli::try_parse_from([
        "endorse-cli",
        "admin",
        "overwrite-totals",
        "--history-id",
        id,
        "--total-days-in-top5",
        "12",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Admin {
            command: AdminCommands::OverwriteTotals {
                total_days_endorsed: None,
                total_days_in_top5: Some(12),
                total_days_in_top10: None,
                ..
            }
        })
    ));
}

#[test]
fn admin_delete_period_requires_both_ids() {
    let result = Cli::try_parse_from([
        "endorse-cli",
        "admin",
        "delete-period",
        "--history-id",
        "7f1c1f9e-2a4b-4c1d-9d62-0d7f3c1e5a10",
    ]);
    assert!(result.is_err());
}
