use std::time::Duration;

/// One entry in the closed, statically-known set of warm pools (spec §9
/// Design Notes): a model kind bound to a distinct load command and cold
/// command, rather than eight near-duplicate structs.
#[derive(Debug, Clone, Copy)]
pub struct ModelKind {
    /// Stable identifier, e.g. `"resnet50"`.
    pub name: &'static str,
    /// Substring matched against the request's `action_name` (spec §6).
    pub action_substring: &'static str,
    /// Script that loads the model and blocks on stdin.
    pub warm_script: &'static str,
    /// Script that runs once end-to-end and exits.
    pub cold_script: &'static str,
    /// Per-kind `Interact` timeout (spec §4.A: design constant 15s).
    pub interact_timeout: Duration,
    /// Whether this kind's child is launched in its own process group so a
    /// `Stop()` can SIGKILL the whole group (spec §4.A, §9 Design Notes).
    pub process_group: bool,
}

const INTERACT_TIMEOUT: Duration = Duration::from_secs(15);

/// Reference mapping from spec §6.
pub static MODEL_KINDS: &[ModelKind] = &[
    ModelKind {
        name: "alex",
        action_substring: "ptest01",
        warm_script: "loadalex",
        cold_script: "funcalex",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "vgg",
        action_substring: "ptest02",
        warm_script: "loadvgg",
        cold_script: "funcvgg",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "inception",
        action_substring: "ptest03",
        warm_script: "loadinception",
        cold_script: "funcinception",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "resnet18",
        action_substring: "ptest04",
        warm_script: "loadres18",
        cold_script: "func18",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "resnet50",
        action_substring: "ptest05",
        warm_script: "loadres50",
        cold_script: "func50",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "resnet152",
        action_substring: "ptest06",
        warm_script: "loadres152",
        cold_script: "func152",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "googlenet",
        action_substring: "ptest07",
        warm_script: "loadgooglenet",
        cold_script: "funcgooglenet",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
    ModelKind {
        name: "bert",
        action_substring: "ptest08",
        warm_script: "loadbert",
        cold_script: "funcbert",
        interact_timeout: INTERACT_TIMEOUT,
        process_group: true,
    },
];

/// Resolve the model kind for a request's `action_name` by substring match
/// against the fixed table (spec §3, §6). Returns `None` for the `generic`
/// fallback (non-inference uploaded actions).
pub fn resolve(action_name: &str) -> Option<&'static ModelKind> {
    MODEL_KINDS
        .iter()
        .find(|k| action_name.contains(k.action_substring))
}

/// Slot index used for the fixed lock order required by `StopAllExcept`
/// (spec §5: "slot-A < slot-B by kind index to avoid cycles").
pub fn slot_index(name: &str) -> usize {
    MODEL_KINDS
        .iter()
        .position(|k| k.name == name)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_each_reference_substring() {
        assert_eq!(resolve("ptest01-foo").unwrap().name, "alex");
        assert_eq!(resolve("ptest05").unwrap().name, "resnet50");
        assert_eq!(resolve("ptest08-bert-v2").unwrap().name, "bert");
    }

    #[test]
    fn unknown_action_name_falls_back_to_generic() {
        assert!(resolve("some-uploaded-action").is_none());
    }

    #[test]
    fn slot_index_is_stable_and_total() {
        for (i, k) in MODEL_KINDS.iter().enumerate() {
            assert_eq!(slot_index(k.name), i);
        }
    }
}
