use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ComponentId, FormId};

/// Events emitted on a form's change bus. Exactly one `Change` is emitted per
/// externally-triggered mutation, after the mutation is fully applied and the
/// conditional pass has re-run; consumers only ever see consistent merged
/// values, never partial or error states.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FormEvent {
    #[serde(rename = "change")]
    Change { form_id: FormId, value: Value },

    #[serde(rename = "redraw")]
    Redraw { form_id: FormId },

    #[serde(rename = "subform_ready")]
    SubformReady {
        form_id: FormId,
        component_id: ComponentId,
    },

    #[serde(rename = "subform_failed")]
    SubformFailed {
        form_id: FormId,
        component_id: ComponentId,
        error: String,
    },

    /// A conditional rule failed to evaluate. The component was treated as
    /// visible (fail open); this event surfaces the failure to the host.
    #[serde(rename = "evaluation_failed")]
    EvaluationFailed {
        form_id: FormId,
        component_key: String,
        error: String,
    },
}

impl FormEvent {
    pub fn form_id(&self) -> &FormId {
        match self {
            Self::Change { form_id, .. }
            | Self::Redraw { form_id }
            | Self::SubformReady { form_id, .. }
            | Self::SubformFailed { form_id, .. }
            | Self::EvaluationFailed { form_id, .. } => form_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::Redraw { .. } => "redraw",
            Self::SubformReady { .. } => "subform_ready",
            Self::SubformFailed { .. } => "subform_failed",
            Self::EvaluationFailed { .. } => "evaluation_failed",
        }
    }
}
