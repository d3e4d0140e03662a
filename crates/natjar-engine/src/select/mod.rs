//! Eligibility selection
//!
//! Decides which program methods are translated. Selection runs a pipeline of
//! [`SelectionPolicy`] values over every method of every program class; the
//! first policy that declines or forces a method decides its fate. A method
//! every policy accepts is marked for compilation. Selection only reads bytecode and always
//! recomputes marks from scratch, so running it twice yields the same marks.

mod annotation;
mod eligibility;
pub mod pattern;

use std::fmt;

use crate::config::{ConfigError, MethodPattern};
use crate::index::{MethodId, ProgramIndex};

pub use annotation::{AnnotationPolicy, COMPILE_ANNOTATION, SKIP_ANNOTATION};
pub use eligibility::{ExclusionPolicy, StructuralPolicy, UnsupportedInstructionPolicy};
pub use pattern::{compile_glob, ExclusionPattern};

/// Why a method was left in bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The body uses an instruction the translator cannot lower
    Unsupported(String),
    /// An exclusion pattern matched
    ExcludedByConfig,
    /// Annotated `@Skip`
    ExcludedByAnnotation,
}

/// Informational notice for a method that will not be translated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipNotice {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkipNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SkipReason::Unsupported(what) => write!(
                f,
                "Unsupported {}! Method \"{}\" (Parent: \"{}\", desc: \"{}\") will be ignored.",
                what, self.name, self.owner, self.descriptor
            ),
            SkipReason::ExcludedByConfig => write!(
                f,
                "Method \"{}\" (Parent: \"{}\", desc: \"{}\") will be ignored by config.",
                self.name, self.owner, self.descriptor
            ),
            SkipReason::ExcludedByAnnotation => write!(
                f,
                "Method \"{}\" (Parent: \"{}\", desc: \"{}\") will be ignored by annotation.",
                self.name, self.owner, self.descriptor
            ),
        }
    }
}

/// A policy's verdict on one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Marked without consulting later policies
    Force,
    /// Declined without a notice
    Decline,
    /// Declined with a reason reported to the user
    Reject(SkipReason),
}

/// One step of the selection pipeline
pub trait SelectionPolicy {
    /// Name of this policy (for diagnostics)
    fn name(&self) -> &str;

    /// Called once per selection run before any method is visited
    fn init(&mut self, _index: &ProgramIndex) {}

    /// Judge one method
    fn preprocess(&self, index: &ProgramIndex, method: MethodId) -> Verdict;
}

/// Runs policies in order over the program
pub struct Preprocessor {
    policies: Vec<Box<dyn SelectionPolicy>>,
}

impl Preprocessor {
    /// Empty pipeline: every method is accepted
    pub fn empty() -> Self {
        Preprocessor { policies: vec![] }
    }

    /// The standard pipeline: structural checks, unsupported instructions,
    /// annotations, then exclusion patterns
    pub fn standard(patterns: &[MethodPattern]) -> Result<Self, ConfigError> {
        let mut pre = Preprocessor::empty();
        pre.add_policy(Box::new(StructuralPolicy));
        pre.add_policy(Box::new(UnsupportedInstructionPolicy));
        pre.add_policy(Box::new(AnnotationPolicy));
        if !patterns.is_empty() {
            pre.add_policy(Box::new(ExclusionPolicy::new(patterns)?));
        }
        Ok(pre)
    }

    pub fn add_policy(&mut self, policy: Box<dyn SelectionPolicy>) {
        self.policies.push(policy);
    }

    /// Mark every accepted program method; returns the notices of rejected
    /// ones in program order
    pub fn run(&mut self, index: &mut ProgramIndex) -> Vec<SkipNotice> {
        for policy in &mut self.policies {
            policy.init(index);
        }

        let mut notices = Vec::new();
        let mut marks = Vec::new();
        for class in index.class_ids() {
            if index.class(class).is_library() {
                continue;
            }
            for id in index.method_ids(class) {
                let verdict = self
                    .policies
                    .iter()
                    .map(|p| p.preprocess(index, id))
                    .find(|v| *v != Verdict::Accept)
                    .unwrap_or(Verdict::Accept);

                if let Verdict::Reject(reason) = &verdict {
                    let method = index.method(id);
                    let notice = SkipNotice {
                        owner: index.class(class).name.clone(),
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        reason: reason.clone(),
                    };
                    tracing::info!("{}", notice);
                    notices.push(notice);
                }
                marks.push((id, matches!(verdict, Verdict::Accept | Verdict::Force)));
            }
        }

        let marked = marks.iter().filter(|(_, m)| *m).count();
        for (id, mark) in marks {
            index.set_marked(id, mark);
        }
        tracing::info!(marked, skipped = notices.len(), "selection finished");
        notices
    }
}

/// Mark the methods eligible for translation under the standard policy
pub fn select_for_compilation(
    index: &mut ProgramIndex,
    patterns: &[MethodPattern],
) -> Result<Vec<SkipNotice>, ConfigError> {
    let _span = tracing::info_span!("select").entered();
    Ok(Preprocessor::standard(patterns)?.run(index))
}
