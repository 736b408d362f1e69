mod common;

use std::fs;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::str::contains;

fn crm_sync(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("crm-sync").expect("binary exists");
    cmd.current_dir(workspace.path())
        .env_remove("CRM_API_URL")
        .env_remove("CRM_API_TOKEN")
        .env_remove("CRM_HOST")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn help_lists_the_commands() {
    let workspace = TestWorkspace::new();
    crm_sync(&workspace)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("import"))
        .stdout(contains("derive"))
        .stdout(contains("summary"))
        .stdout(contains("users"));
}

#[test]
fn derive_writes_contacts_offline() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "deals.csv",
        "Company,Source Name\nAcme,\"Alice, Bob\"\nGlobex,bob\nInitech,\n",
    );
    let output = workspace.path().join("contacts.csv");
    crm_sync(&workspace)
        .args([
            "derive",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read contacts");
    assert_eq!(contents, "contact\nAlice\nBob\n");
}

#[test]
fn derive_prints_to_stdout_without_output() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("deals.csv", "Company;Contacted person\nAcme;Ann и Petr\n");
    crm_sync(&workspace)
        .args(["derive", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout("contact\nAnn\nPetr\n");
}

#[test]
fn mismatched_upload_fails_before_reaching_the_server() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("prices.csv", "Name,Price\nWidget,3\n");
    crm_sync(&workspace)
        .args([
            "--api-url",
            "http://127.0.0.1:9/api",
            "import",
            "-i",
            input.to_str().unwrap(),
            "--resource",
            "pipeline",
        ])
        .assert()
        .failure()
        .stderr(contains("Incorrect file for pipeline"))
        .stderr(contains("Company"));
}

#[test]
fn unrecognized_upload_without_resource_is_rejected() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("prices.csv", "Name,Price\nWidget,3\n");
    crm_sync(&workspace)
        .args([
            "--api-url",
            "http://127.0.0.1:9/api",
            "import",
            "-i",
            input.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error:"));
}

#[test]
fn unknown_resource_is_a_usage_error() {
    let workspace = TestWorkspace::new();
    crm_sync(&workspace)
        .args(["list", "--resource", "invoices"])
        .assert()
        .failure()
        .stderr(contains("invoices"));
}
