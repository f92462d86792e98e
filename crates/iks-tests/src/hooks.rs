//! Post-apply hooks.

use testhelper::{validate_terraform_outputs, HookFuture, TestOptions};
use tracing::info;

/// Output naming the provisioned cluster.
pub const CLUSTER_NAME_OUTPUT: &str = "cluster_name";

/// Check that the cluster from the last apply has healthy ingress.
///
/// Problems are recorded in the options' soft assertions; the hook itself
/// never fails the run.
pub fn get_cluster_ingress(options: &TestOptions) -> HookFuture<'_> {
    Box::pin(async move {
        let outputs = match options.last_apply_outputs().await {
            Ok(outputs) => outputs,
            Err(e) => {
                options
                    .assertions
                    .fail(format!("error getting last terraform apply outputs: {e}"));
                return Ok(());
            }
        };

        if let Err(e) = validate_terraform_outputs(&outputs, &[CLUSTER_NAME_OUTPUT]) {
            options
                .assertions
                .fail(format!("Some outputs not found or nil: {e}"));
            return Ok(());
        }

        let Some(cluster) = outputs.get(CLUSTER_NAME_OUTPUT).and_then(|v| v.as_str()) else {
            options
                .assertions
                .fail(format!("Output {CLUSTER_NAME_OUTPUT} is not a string"));
            return Ok(());
        };

        info!(target: "iks_tests.hooks", cluster, "Checking cluster ingress");
        options
            .check_cluster_ingress_healthy_default_timeout(cluster)
            .await;
        Ok(())
    })
}
