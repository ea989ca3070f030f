use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::cancel::CancelToken;
use super::checkpoint::{Checkpoint, GateDecision, PipelineState, ReviewItem};
use super::correction::apply_corrections_with_report;
use super::extraction::{extract, PatternTable, ProcedureKind};
use super::merge::{merge_overrides_with_report, UserOverrides};
use super::validation::{AuditStatus, MissingField, ValidationResult, Validator};
use super::PipelineError;
use crate::record::{diff_records, FieldChange, FieldPath, Record};

/// Reason attached to required fields the extractor did not fill.
const REQUIRED_FIELD_REASON: &str = "Required for this procedure but not found in dictation";

/// State carried by the caller across an `awaiting_input` pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeContext {
    pub prior_record: Record,
    pub prior_validation: ValidationResult,
    #[serde(default)]
    pub overrides: UserOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    AwaitingInput,
    Ready,
}

impl From<PipelineState> for PipelineStatus {
    fn from(state: PipelineState) -> Self {
        match state {
            PipelineState::Ready => PipelineStatus::Ready,
            _ => PipelineStatus::AwaitingInput,
        }
    }
}

/// Output of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub status: PipelineStatus,
    pub record: Record,
    pub validation: ValidationResult,
    /// Unresolved items blocking finalization; empty when ready.
    #[serde(default)]
    pub pending_review: Vec<ReviewItem>,
    /// What correction (first pass) or merge (resume) changed.
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    /// How the audit concluded. `None` on resume, which does not re-audit.
    #[serde(default)]
    pub audit_status: Option<AuditStatus>,
    pub processed_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn is_ready(&self) -> bool {
        self.status == PipelineStatus::Ready
    }

    /// Context for resuming from this result with human-confirmed values.
    pub fn resume_with(&self, overrides: UserOverrides) -> ResumeContext {
        ResumeContext {
            prior_record: self.record.clone(),
            prior_validation: self.validation.clone(),
            overrides,
        }
    }
}

/// Extract → validate → correct → gate, or on resume merge → gate.
pub struct Pipeline {
    table: PatternTable,
    validator: Validator,
    checkpoint: Checkpoint,
    required_fields: Vec<FieldPath>,
}

impl Pipeline {
    pub fn new(table: PatternTable, validator: Validator) -> Self {
        Self {
            table,
            validator,
            checkpoint: Checkpoint::default(),
            required_fields: Vec::new(),
        }
    }

    /// Pipeline using a built-in table and that procedure's critical fields.
    pub fn for_procedure(kind: ProcedureKind, validator: Validator) -> Result<Self, PipelineError> {
        let required = kind
            .critical_fields()
            .iter()
            .map(|field| FieldPath::parse(field))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(kind.pattern_table()?, validator).with_required_fields(required))
    }

    pub fn with_threshold(mut self, threshold: f32) -> Result<Self, PipelineError> {
        self.checkpoint = Checkpoint::new(threshold)?;
        Ok(self)
    }

    /// Fields that count as missing-critical whenever blank, regardless of
    /// what the auditor reports.
    pub fn with_required_fields(mut self, fields: Vec<FieldPath>) -> Self {
        self.required_fields = fields;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.checkpoint.threshold()
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    pub async fn process(
        &self,
        text: &str,
        resume: Option<ResumeContext>,
    ) -> Result<PipelineResult, PipelineError> {
        self.process_with_cancel(text, resume, None).await
    }

    /// Run one invocation. Only empty input and contract violations fail;
    /// audit problems degrade the validation instead.
    pub async fn process_with_cancel(
        &self,
        text: &str,
        resume: Option<ResumeContext>,
        cancel: Option<&CancelToken>,
    ) -> Result<PipelineResult, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("process", %run_id, resuming = resume.is_some());

        async move {
            let result = match resume {
                None => self.run_first_pass(run_id, text, cancel).await?,
                Some(context) => self.run_resume(run_id, context)?,
            };
            tracing::info!(
                status = ?result.status,
                pending = result.pending_review.len(),
                changes = result.changes.len(),
                "Pipeline invocation complete"
            );
            Ok::<_, PipelineError>(result)
        }
        .instrument(span)
        .await
    }

    async fn run_first_pass(
        &self,
        run_id: Uuid,
        text: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<PipelineResult, PipelineError> {
        let extracted = extract(text, &self.table);
        tracing::debug!(
            state = %PipelineState::Extracted,
            fields = extracted.as_map().len(),
            "Extraction finished"
        );

        let audit = self.validator.audit(&extracted, text, cancel).await;
        let mut validation = audit.result;

        let corrected = apply_corrections_with_report(
            &extracted,
            &validation.corrections,
            self.checkpoint.threshold(),
        )?;
        self.add_required_fields(&corrected.record, &mut validation);

        let decision =
            self.checkpoint
                .advance(PipelineState::Validated, &corrected.record, &validation)?;
        let changes = diff_records(&extracted, &corrected.record);

        Ok(build_result(
            run_id,
            decision,
            corrected.record,
            validation,
            changes,
            Some(audit.status),
        ))
    }

    fn run_resume(
        &self,
        run_id: Uuid,
        context: ResumeContext,
    ) -> Result<PipelineResult, PipelineError> {
        let ResumeContext {
            prior_record,
            mut prior_validation,
            overrides,
        } = context;

        if overrides.is_empty() {
            tracing::debug!("Resume without overrides; rechecking prior record");
        }

        self.add_required_fields(&prior_record, &mut prior_validation);
        let merged = merge_overrides_with_report(&prior_record, &overrides);

        let decision = self.checkpoint.advance(
            PipelineState::AwaitingInput,
            &merged.record,
            &prior_validation,
        )?;
        let changes = diff_records(&prior_record, &merged.record);

        Ok(build_result(
            run_id,
            decision,
            merged.record,
            prior_validation,
            changes,
            None,
        ))
    }

    /// Append blank required fields to `missing_critical`, skipping any the
    /// auditor already listed.
    fn add_required_fields(&self, record: &Record, validation: &mut ValidationResult) {
        for field in &self.required_fields {
            let listed = validation
                .missing_critical
                .iter()
                .any(|missing| missing.field == *field);
            if listed || !record.is_blank(field) {
                continue;
            }
            tracing::debug!(field = %field, "Required field missing after extraction");
            validation.missing_critical.push(MissingField {
                field: field.clone(),
                critical: true,
                reason: REQUIRED_FIELD_REASON.to_string(),
            });
        }
    }
}

fn build_result(
    run_id: Uuid,
    decision: GateDecision,
    record: Record,
    validation: ValidationResult,
    changes: Vec<FieldChange>,
    audit_status: Option<AuditStatus>,
) -> PipelineResult {
    PipelineResult {
        run_id,
        status: decision.state.into(),
        record,
        validation,
        pending_review: decision.pending,
        changes,
        audit_status,
        processed_at: Utc::now(),
    }
}
