use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::PipelineError,
    models::{DesignStatus, FlowType, Inquiry, NewInquiry, SavedDesign},
    store::DesignStore,
};

const INQUIRY_SOURCE: &str = "ai_designer";
const INQUIRY_STATUS: &str = "new";

/// Turns an owned, not-yet-submitted design into exactly one CAD inquiry.
pub struct SubmissionBridge {
    store: Arc<dyn DesignStore>,
}

impl SubmissionBridge {
    pub fn new(store: Arc<dyn DesignStore>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, design_id: Uuid, user_id: Uuid) -> Result<Inquiry, PipelineError> {
        let design = self
            .store
            .get_design(design_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("design {design_id} not found")))?;

        if design.user_id != user_id {
            return Err(PipelineError::Forbidden("design belongs to another user".into()));
        }
        match design.status {
            DesignStatus::Draft | DesignStatus::Saved => {}
            DesignStatus::SubmittedForCad | DesignStatus::InCad | DesignStatus::Completed => {
                return Err(PipelineError::AlreadySubmitted)
            }
            DesignStatus::Archived => {
                return Err(PipelineError::InvalidInput("archived designs cannot be submitted".into()))
            }
        }

        let inquiry = self.store.create_inquiry(&inquiry_from_design(&design)).await?;

        match self.store.mark_submitted(design_id, inquiry.id, Utc::now()).await {
            Ok(true) => {
                info!(%design_id, inquiry_id = %inquiry.id, "📨 Design submitted for CAD");
                Ok(inquiry)
            }
            Ok(false) => {
                warn!(%design_id, inquiry_id = %inquiry.id, "Design was submitted concurrently; withdrawing inquiry");
                self.withdraw(design_id, inquiry.id).await;
                Err(PipelineError::AlreadySubmitted)
            }
            Err(e) => {
                if self.transition_landed(design_id, inquiry.id).await {
                    warn!(%design_id, inquiry_id = %inquiry.id, error = %e, "Transition reported an error but was applied");
                    return Ok(inquiry);
                }
                error!(%design_id, inquiry_id = %inquiry.id, error = %e, "❌ Failed to mark design submitted");
                self.withdraw(design_id, inquiry.id).await;
                Err(PipelineError::DownstreamWriteFailure(e.to_string()))
            }
        }
    }

    /// A failed write may still have been applied; the design row decides.
    async fn transition_landed(&self, design_id: Uuid, inquiry_id: Uuid) -> bool {
        match self.store.get_design(design_id).await {
            Ok(Some(design)) => {
                design.status == DesignStatus::SubmittedForCad && design.inquiry_id == Some(inquiry_id)
            }
            Ok(None) => false,
            Err(e) => {
                warn!(%design_id, error = %e, "Could not re-read design after failed transition");
                false
            }
        }
    }

    async fn withdraw(&self, design_id: Uuid, inquiry_id: Uuid) {
        if let Err(e) = self.store.delete_inquiry(inquiry_id).await {
            error!(
                %design_id,
                %inquiry_id,
                error = %e,
                "Orphaned inquiry needs manual reconciliation"
            );
        }
    }
}

pub fn inquiry_from_design(design: &SavedDesign) -> NewInquiry {
    let piece_type = match design.flow_type {
        FlowType::Engagement => "engagement_ring".to_string(),
        FlowType::General => design
            .form_inputs
            .project_type
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "custom_jewelry".to_string()),
    };
    NewInquiry {
        user_id: design.user_id,
        design_id: design.id,
        piece_type,
        description: design.concept.spec_sheet(),
        budget: design.form_inputs.budget.clone().filter(|b| !b.trim().is_empty()),
        image_urls: design.images().urls(),
        source: INQUIRY_SOURCE.to_string(),
        status: INQUIRY_STATUS.to_string(),
    }
}
