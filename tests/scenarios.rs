use std::fs;
use std::path::Path;
use std::process::ExitCode;

use tempfile::tempdir;

use patient_splits::apps::run_split_patients;
use patient_splits::constants::splits::ALL_SPLITS;
use patient_splits::{
    DiseaseTag, PatientSplitter, SplitConfig, SplitError, SplitLabel, SplitMetadata, SplitRatios,
    ValidationCheck,
};

/// Four patients across two sources; `radiopaedia_5` has no caption.
fn write_four_patient_fixture(root: &Path) -> std::path::PathBuf {
    let captions = root.join("captions");
    fs::create_dir_all(&captions).unwrap();
    fs::write(
        captions.join("chexpert_patient1_study1_view1_frontal.txt"),
        "Patchy right lower lobe pneumonia.",
    )
    .unwrap();
    fs::write(
        captions.join("chexpert_patient1_study2_view1_frontal.txt"),
        "Improving pneumonia.",
    )
    .unwrap();
    fs::write(
        captions.join("chexpert_patient2_study1_view1_frontal.txt"),
        "No acute cardiopulmonary process.",
    )
    .unwrap();
    fs::write(
        captions.join("radiopaedia_9_1.txt"),
        "Marked cardiomegaly.",
    )
    .unwrap();

    let master_index = root.join("master_index.csv");
    fs::write(
        &master_index,
        "filename,source,image_path,caption_path,has_caption,file_size_mb,date_added,view\n\
         chexpert_patient1_study1_view1_frontal.jpg,CheXpert,Images/chexpert_patient1_study1_view1_frontal.jpg,captions/chexpert_patient1_study1_view1_frontal.txt,True,0.21,2025-10-01 10:00:00,PA\n\
         chexpert_patient1_study2_view1_frontal.jpg,CheXpert,Images/chexpert_patient1_study2_view1_frontal.jpg,captions/chexpert_patient1_study2_view1_frontal.txt,True,0.19,2025-10-01 10:00:00,PA\n\
         chexpert_patient2_study1_view1_frontal.jpg,CheXpert,Images/chexpert_patient2_study1_view1_frontal.jpg,captions/chexpert_patient2_study1_view1_frontal.txt,True,0.20,2025-10-01 10:00:00,AP\n\
         radiopaedia_5_1.jpg,Radiopaedia,Images/radiopaedia_5_1.jpg,,False,0.33,2025-10-01 10:00:00,PA\n\
         radiopaedia_9_1.jpg,Radiopaedia,Images/radiopaedia_9_1.jpg,captions/radiopaedia_9_1.txt,True,0.41,2025-10-01 10:00:00,PA\n",
    )
    .unwrap();
    master_index
}

fn scenario_config(root: &Path) -> SplitConfig {
    SplitConfig {
        ratios: SplitRatios {
            train: 0.5,
            validation: 0.25,
            test: 0.25,
        },
        data_root: Some(root.to_path_buf()),
        ..SplitConfig::default()
    }
}

#[test]
fn four_patient_scenario_assigns_everyone_exactly_once() {
    let root = tempdir().unwrap();
    let master_index = write_four_patient_fixture(root.path());
    let output = root.path().join("splits");

    let splitter = PatientSplitter::new(scenario_config(root.path())).unwrap();
    let run = splitter.run(&master_index, &output).unwrap();

    let mapping: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&fs::read(output.join("patient_mapping.json")).unwrap()).unwrap();
    let ids: Vec<&str> = mapping.keys().map(String::as_str).collect();
    assert_eq!(
        ids,
        vec![
            "chexpert_patient1",
            "chexpert_patient2",
            "radiopaedia_5",
            "radiopaedia_9"
        ]
    );

    let validation = &run.metadata.validation;
    assert!(validation.passed(ValidationCheck::Completeness));
    assert!(validation.passed(ValidationCheck::NoOverlap));
    // every stratum holds a single patient, so floor cuts send everyone to test
    assert_eq!(run.metadata.test.n_patients, 4);
    assert_eq!(run.metadata.test.n_images, 5);
    assert!(!validation.passed(ValidationCheck::RatioFidelity));
    assert!(!validation.passed(ValidationCheck::SourceCoverage));
    assert!(!run.is_valid());
    assert_eq!(run.metadata.diagnostics.captions.images_without_captions, 1);
    assert_eq!(run.metadata.diagnostics.grouping.multi_image_patients, 1);
}

#[test]
fn four_patient_scenario_labels() {
    let root = tempdir().unwrap();
    let master_index = write_four_patient_fixture(root.path());
    let inventory = patient_splits::Inventory::load(&master_index).unwrap();
    let splitter = PatientSplitter::new(scenario_config(root.path())).unwrap();
    let outcome = splitter.split(&inventory).unwrap();

    let single = |patient_id: &str| -> Vec<DiseaseTag> {
        outcome
            .labels(patient_id)
            .unwrap()
            .iter()
            .copied()
            .collect()
    };
    assert_eq!(single("chexpert_patient1"), vec![DiseaseTag::Pneumonia]);
    assert_eq!(single("chexpert_patient2"), vec![DiseaseTag::Normal]);
    assert_eq!(single("radiopaedia_5"), vec![DiseaseTag::Unspecified]);
    assert_eq!(single("radiopaedia_9"), vec![DiseaseTag::Cardiomegaly]);
    assert_eq!(outcome.groups().get("chexpert_patient1").unwrap().images.len(), 2);
}

#[test]
fn split_tables_carry_input_columns_plus_patient_and_split() {
    let root = tempdir().unwrap();
    let master_index = write_four_patient_fixture(root.path());
    let output = root.path().join("splits");
    PatientSplitter::new(scenario_config(root.path()))
        .unwrap()
        .run(&master_index, &output)
        .unwrap();

    let test_table = fs::read_to_string(output.join("test_index.csv")).unwrap();
    let mut lines = test_table.lines();
    assert_eq!(
        lines.next(),
        Some(
            "filename,source,image_path,caption_path,has_caption,file_size_mb,date_added,view,patient_id,split"
        )
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(
        rows[3],
        "radiopaedia_5_1.jpg,Radiopaedia,Images/radiopaedia_5_1.jpg,,False,0.33,2025-10-01 10:00:00,PA,radiopaedia_5,test"
    );
    for label in [SplitLabel::Train, SplitLabel::Validation] {
        let table = fs::read_to_string(output.join(label.table_filename())).unwrap();
        assert_eq!(table.lines().count(), 1, "{label} should only hold a header");
    }

    let metadata = SplitMetadata::load(output.join("split_metadata.json")).unwrap();
    assert_eq!(metadata.random_seed, 42);
    assert!((metadata.test.source_distribution["Radiopaedia"] - 0.5).abs() < 1e-9);
    assert!((metadata.test.disease_distribution["unspecified"] - 0.25).abs() < 1e-9);
}

#[test]
fn invalid_ratios_fail_before_anything_is_written() {
    let root = tempdir().unwrap();
    let master_index = write_four_patient_fixture(root.path());
    let output = root.path().join("splits");

    let config = SplitConfig {
        ratios: SplitRatios {
            train: 0.7,
            validation: 0.2,
            test: 0.2,
        },
        ..scenario_config(root.path())
    };
    let err = PatientSplitter::new(config).unwrap_err();
    assert!(matches!(err, SplitError::InvalidRatio { .. }));
    assert!(!output.exists());

    let cli_err = run_split_patients(
        [
            "--master-index",
            master_index.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
            "--split-ratios",
            "0.7,0.2,0.2",
        ]
        .into_iter()
        .map(String::from),
    )
    .unwrap_err();
    assert!(cli_err.to_string().contains("sum to 1.0"));
    assert!(!output.exists());
}

#[test]
fn unknown_source_aborts_without_output() {
    let root = tempdir().unwrap();
    let master_index = root.path().join("master_index.csv");
    fs::write(
        &master_index,
        "filename,source,image_path,caption_path,has_caption\n\
         chexpert_patient1_a.jpg,CheXpert,a.jpg,,False\n\
         padchest_7.png,PadChest,b.png,,False\n",
    )
    .unwrap();
    let output = root.path().join("splits");

    let err = PatientSplitter::new(SplitConfig::default())
        .unwrap()
        .run(&master_index, &output)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("PadChest"));
    assert!(message.contains("padchest_7.png"));
    assert!(!output.exists());
}

#[test]
fn missing_columns_abort_without_output() {
    let root = tempdir().unwrap();
    let master_index = root.path().join("master_index.csv");
    fs::write(&master_index, "filename,source\nchexpert_patient1_a.jpg,CheXpert\n").unwrap();
    let output = root.path().join("splits");

    let err = PatientSplitter::new(SplitConfig::default())
        .unwrap()
        .run(&master_index, &output)
        .unwrap_err();
    match err {
        SplitError::Schema { missing, .. } => {
            assert_eq!(missing, vec!["image_path", "caption_path", "has_caption"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[test]
fn cli_reports_invalid_split_with_exit_code_two() {
    let root = tempdir().unwrap();
    let master_index = write_four_patient_fixture(root.path());
    let output = root.path().join("splits");
    let code = run_split_patients(
        [
            "--master-index",
            master_index.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
            "--split-ratios",
            "0.5,0.25,0.25",
            "--data-root",
            root.path().to_str().unwrap(),
        ]
        .into_iter()
        .map(String::from),
    )
    .unwrap();
    assert_eq!(code, ExitCode::from(2));
    for label in ALL_SPLITS {
        assert!(output.join(label.table_filename()).exists());
    }
}
