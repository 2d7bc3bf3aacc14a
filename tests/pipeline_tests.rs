/// Integration tests for the upload -> derive -> predict -> report pipeline
/// using the demo artifact and data under demos/.
///
/// Run with: cargo test --test pipeline_tests -- --nocapture

use std::path::PathBuf;

use engine_health::{
    error::{ModelError, PredictError},
    features::{derive_features, DerivedFeatures, DERIVED_COLUMNS},
    model::{load_model, predict_table},
    report::PredictionReport,
    table::{SensorTable, GROUND_TRUTH, PREDICTED},
};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn demo_table() -> SensorTable {
    let data = std::fs::read(demo("engine_data.csv")).expect("demo csv");
    SensorTable::from_csv_bytes(&data).expect("demo csv parses")
}

#[test]
fn test_demo_model_loads() {
    println!("\n=== Test: Demo artifact ===");
    let mdl = load_model(demo("vehicle_health_model.json")).expect("demo model loads");
    assert_eq!(mdl.kind(), "forest");
    assert_eq!(mdl.schema().features.len(), 9);
    for d in DERIVED_COLUMNS {
        assert!(mdl.schema().features.iter().any(|f| f == d), "{} not in schema", d);
    }
    println!("✓ {} v{}", mdl.schema().name, mdl.schema().version);
}

#[test]
fn test_round_trip_keeps_rows_and_columns() {
    println!("\n=== Test: Round trip ===");
    let mdl = load_model(demo("vehicle_health_model.json")).unwrap();
    let table = demo_table();
    let labels = predict_table(mdl.as_ref(), &table).unwrap();
    assert_eq!(labels.len(), table.len());
    assert!(labels.iter().all(|l| *l == 0 || *l == 1));

    let report = PredictionReport::build(&table, labels).unwrap();
    let back = SensorTable::from_csv_bytes(&report.csv).unwrap();
    assert_eq!(back.len(), table.len());
    assert_eq!(back.headers().len(), table.headers().len() + 1);
    assert_eq!(&back.headers()[..table.headers().len()], table.headers());
    assert_eq!(back.headers().last().map(String::as_str), Some(PREDICTED));
    for (orig, out) in table.rows().zip(back.rows()) {
        assert_eq!(orig[..], out[..orig.len()]);
    }
    println!("✓ {} rows, {} columns", back.len(), back.headers().len());
}

#[test]
fn test_accuracy_is_match_fraction() {
    let mdl = load_model(demo("vehicle_health_model.json")).unwrap();
    let table = demo_table();
    let labels = predict_table(mdl.as_ref(), &table).unwrap();
    let truth = table.ground_truth().unwrap().expect("demo has labels");

    let hits = truth.iter().zip(&labels).filter(|(t, p)| t == p).count();
    let report = PredictionReport::build(&table, labels).unwrap();
    let eval = report.evaluation.expect("ground truth present");
    assert!((0.0..=1.0).contains(&eval.accuracy));
    assert!((eval.accuracy - hits as f64 / truth.len() as f64).abs() < 1e-12);
    assert_eq!(eval.report.total, truth.len());
    println!("✓ accuracy {:.2}", eval.accuracy);
}

#[test]
fn test_first_demo_row_is_healthy() {
    // rpm 700, Temp_Diff -2.51, Pressure_Ratio 3.38, Lub oil pressure 2.49
    // -> leaves [.2,.8], [.3,.7], [.55,.45]
    let mdl = load_model(demo("vehicle_health_model.json")).unwrap();
    let labels = predict_table(mdl.as_ref(), &demo_table()).unwrap();
    assert_eq!(labels[0], 1);
}

#[test]
fn test_ground_truth_never_reaches_model() {
    let table = demo_table();
    assert!(table.has_column(GROUND_TRUTH));
    let frame = derive_features(&table).unwrap();
    assert!(!frame.columns().iter().any(|c| c == GROUND_TRUTH));
}

#[test]
fn test_denominators_stay_positive_for_zero_readings() {
    println!("\n=== Test: Zero readings ===");
    for (lop, lot) in [(0.0, 0.0), (0.0, 75.0), (3.0, 0.0)] {
        let d = DerivedFeatures::compute(80.0, lot, 10.0, lop, 1000.0);
        assert!(d.pressure_ratio.is_finite());
        assert!(d.load_temp_ratio.is_finite());
        assert_eq!(d.pressure_ratio, 10.0 / (lop + 1.0));
        assert_eq!(d.load_temp_ratio, 1000.0 / (lot + 1.0));
    }
    println!("✓ No division by zero");
}

#[test]
fn test_extra_column_fails_fast() {
    let mdl = load_model(demo("vehicle_health_model.json")).unwrap();
    let table = SensorTable::from_csv_bytes(
        b"Engine rpm,Lub oil pressure,Fuel pressure,Coolant pressure,lub oil temp,Coolant temp,Ambient temp\n\
          700,2.4,11.7,3.1,84.1,81.6,22\n",
    )
    .unwrap();
    match predict_table(mdl.as_ref(), &table) {
        Err(PredictError::Model(ModelError::SchemaMismatch { unexpected, missing, .. })) => {
            assert_eq!(unexpected, vec!["Ambient temp"]);
            assert!(missing.is_empty());
        }
        other => panic!("expected schema mismatch, got {:?}", other),
    }
}
