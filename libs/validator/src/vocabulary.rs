use once_cell::sync::Lazy;
use std::collections::HashMap;

/// `(introduced_version, deprecated_version)`, both encoded `major*100+minor`
/// the way `Contract::schema_version` is. `None` means "always" for
/// `introduced` or "never" for `deprecated`.
pub type VocabEntry = (Option<i32>, Option<i32>);

/// `type → { value → (introduced, deprecated) }`. A handful of representative
/// MTConnect controlled vocabularies; extend as new data-item types need
/// validation.
pub static VOCABULARY: Lazy<HashMap<&'static str, HashMap<&'static str, VocabEntry>>> =
    Lazy::new(|| {
        let mut table: HashMap<&'static str, HashMap<&'static str, VocabEntry>> = HashMap::new();

        let mut execution = HashMap::new();
        execution.insert("READY", (None, None));
        execution.insert("ACTIVE", (None, None));
        execution.insert("STOPPED", (None, None));
        execution.insert("INTERRUPTED", (None, None));
        execution.insert("FEED_HOLD", (None, None));
        execution.insert("WAIT", (Some(105), None));
        execution.insert("PROGRAM_STOPPED", (None, None));
        execution.insert("PROGRAM_COMPLETED", (None, None));
        execution.insert("PROGRAM_OPTIONAL_STOP", (None, Some(200)));
        table.insert("EXECUTION", execution);

        let mut controller_mode = HashMap::new();
        controller_mode.insert("AUTOMATIC", (None, None));
        controller_mode.insert("MANUAL", (None, None));
        controller_mode.insert("MANUAL_DATA_INPUT", (None, None));
        controller_mode.insert("SEMI_AUTOMATIC", (None, None));
        controller_mode.insert("EDIT", (None, None));
        table.insert("CONTROLLER_MODE", controller_mode);

        let mut avail = HashMap::new();
        avail.insert("AVAILABLE", (None, None));
        avail.insert("UNAVAILABLE", (None, None));
        table.insert("AVAILABILITY", avail);

        table
    });
