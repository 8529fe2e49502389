use sm_model::{InstanceIdent, InstanceInfo};

use crate::error::CoreResult;

/// Durable record of the desired instances, used to recover after restart.
pub trait Storage: Send + Sync {
    fn add_instance(&self, instance: &InstanceInfo) -> CoreResult<()>;

    fn update_instance(&self, instance: &InstanceInfo) -> CoreResult<()>;

    fn remove_instance(&self, ident: &InstanceIdent) -> CoreResult<()>;

    fn get_all_instances(&self) -> CoreResult<Vec<InstanceInfo>>;
}
