//! Write options for graph mutations

use kube::api::{DeleteParams, PatchParams, PostParams, PropagationPolicy};

/// Options passed through to the backing store for one vertex
#[derive(Debug, Clone, Default)]
pub struct ClientOption {
    pub propagation_policy: Option<PropagationPolicy>,
    pub grace_period_seconds: Option<u32>,
    pub dry_run: bool,
}

impl ClientOption {
    pub fn background() -> Self {
        Self {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        }
    }

    pub fn delete_params(&self) -> DeleteParams {
        DeleteParams {
            dry_run: self.dry_run,
            grace_period_seconds: self.grace_period_seconds,
            propagation_policy: self.propagation_policy.clone(),
            preconditions: None,
        }
    }

    pub fn post_params(&self, field_manager: &str) -> PostParams {
        PostParams {
            dry_run: self.dry_run,
            field_manager: Some(field_manager.to_string()),
        }
    }

    pub fn patch_params(&self, field_manager: &str) -> PatchParams {
        let mut params = PatchParams::apply(field_manager);
        params.force = false;
        params.dry_run = self.dry_run;
        params
    }
}

/// A single write option
#[derive(Debug, Clone)]
pub enum GraphOption {
    /// Overwrite obj/ori_obj of an already planned vertex
    ReplaceIfExisting,
    /// Invert the kind filter of `find_all`
    HaveDifferentType,
    /// Store options for the vertex
    Client(ClientOption),
}

/// Folded view of a slice of [`GraphOption`]s
#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    pub replace_if_existing: bool,
    pub have_different_type: bool,
    pub client_opt: Option<ClientOption>,
}

impl GraphOptions {
    pub fn from_options(opts: &[GraphOption]) -> Self {
        let mut folded = Self::default();
        for opt in opts {
            match opt {
                GraphOption::ReplaceIfExisting => folded.replace_if_existing = true,
                GraphOption::HaveDifferentType => folded.have_different_type = true,
                GraphOption::Client(client_opt) => folded.client_opt = Some(client_opt.clone()),
            }
        }
        folded
    }
}
