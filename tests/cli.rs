use assert_cmd::Command;

const ONTOLOGY: &str = "tests/fixtures/ontology.json";

fn labelspace() -> Command {
    let mut cmd = Command::cargo_bin("labelspace").unwrap();
    cmd.env_remove("LABELSPACE_ONTOLOGY");
    cmd
}

#[test]
fn runs() {
    labelspace().assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = labelspace();
    cmd.arg("-V");
    cmd.assert().success().stdout("labelspace 0.1.0\n");
}

// Validate subcommand tests

#[test]
fn validate_valid_document_succeeds() {
    let mut cmd = labelspace();
    cmd.args(["validate", "tests/fixtures/valid.json", "--ontology", ONTOLOGY]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Validation passed"));
}

#[test]
fn validate_accepts_a_yaml_ontology() {
    let mut cmd = labelspace();
    cmd.args([
        "validate",
        "tests/fixtures/valid.json",
        "--ontology",
        "tests/fixtures/ontology.yaml",
    ]);
    cmd.assert().success();
}

#[test]
fn validate_reads_ontology_from_env() {
    let mut cmd = labelspace();
    cmd.env("LABELSPACE_ONTOLOGY", ONTOLOGY);
    cmd.args(["validate", "tests/fixtures/valid.json"]);
    cmd.assert().success();
}

#[test]
fn validate_without_ontology_fails() {
    let mut cmd = labelspace();
    cmd.args(["validate", "tests/fixtures/valid.json"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("--ontology"));
}

#[test]
fn validate_invalid_document_fails() {
    let mut cmd = labelspace();
    cmd.args(["validate", "tests/fixtures/invalid.json", "--ontology", ONTOLOGY]);
    cmd.assert()
        .failure()
        .stdout(predicates::str::contains("2 error(s)"))
        .stdout(predicates::str::contains("PolygonTooFewPoints"))
        .stdout(predicates::str::contains("BitmaskDimensionMismatch"))
        .stderr(predicates::str::contains("Validation failed"));
}

#[test]
fn validate_json_output_format() {
    let mut cmd = labelspace();
    cmd.args([
        "validate",
        "tests/fixtures/valid.json",
        "--ontology",
        ONTOLOGY,
        "--output",
        "json",
    ]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("\"error_count\": 0"))
        .stdout(predicates::str::contains("\"warning_count\": 0"));
}

#[test]
fn validate_warnings_pass_unless_strict() {
    let mut cmd = labelspace();
    cmd.args(["validate", "tests/fixtures/warnings.json", "--ontology", ONTOLOGY]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("CoordinateOutOfBounds"));

    let mut cmd = labelspace();
    cmd.args([
        "validate",
        "tests/fixtures/warnings.json",
        "--ontology",
        ONTOLOGY,
        "--strict",
    ]);
    cmd.assert().failure();
}

#[test]
fn validate_nonexistent_file_fails() {
    let mut cmd = labelspace();
    cmd.args(["validate", "nonexistent_file.json", "--ontology", ONTOLOGY]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("IO error"));
}

#[test]
fn validate_rejects_unknown_feature_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unknown.json");
    std::fs::write(
        &path,
        r#"{"labels": {"0": {"objects": [{"objectHash": "a", "featureHash": "obj-plane",
            "boundingBox": {"x": 0, "y": 0, "w": 0.1, "h": 0.1}}]}}}"#,
    )
    .unwrap();

    let mut cmd = labelspace();
    cmd.arg("validate").arg(&path).args(["--ontology", ONTOLOGY]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("obj-plane"));
}

// RLE subcommand tests

#[test]
fn rle_encode_prints_coco_structure() {
    let mut cmd = labelspace();
    cmd.args(["rle", "encode", "tests/fixtures/raster.txt"]);
    cmd.assert()
        .success()
        .stdout("{\"size\":[2,4],\"counts\":\"44\"}\n");
}

#[test]
fn rle_encode_reads_stdin() {
    let mut cmd = labelspace();
    cmd.args(["rle", "encode", "-"]).write_stdin("1 0\n0 1\n");
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("\"size\":[2,2]"));
}

#[test]
fn rle_decode_prints_raster() {
    let mut cmd = labelspace();
    cmd.args(["rle", "decode", "--height", "2", "--width", "4", "44"]);
    cmd.assert().success().stdout("0011\n0011\n");
}

#[test]
fn rle_decode_rejects_wrong_size() {
    let mut cmd = labelspace();
    cmd.args(["rle", "decode", "--height", "3", "--width", "4", "44"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("expected 3x4"));
}
