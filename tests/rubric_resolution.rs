use franchise_eval::{
    config::Config,
    rubric::{RubricSource, framework_for_display, resolve_rubric},
};

// Runs in its own test binary so changing the working directory cannot affect other tests.
#[test]
fn default_rubric_does_not_depend_on_working_directory() {
    let elsewhere = tempfile::tempdir().expect("temp dir");
    std::env::set_current_dir(elsewhere.path()).expect("chdir");

    let config = Config::default();
    let resolved = resolve_rubric(None, config.rubric_path.as_deref());
    assert_eq!(resolved.source, RubricSource::Default);
    assert!(resolved.warning.is_none());
    assert!(
        resolved
            .document
            .as_str()
            .contains("Market Demand Extrapolation")
    );

    let (framework, warning) = framework_for_display(config.rubric_path.as_deref());
    assert!(warning.is_none());
    assert!(framework.dimensions.iter().all(|d| !d.criteria.is_empty()));
}
