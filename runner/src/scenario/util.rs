use std::sync::Arc;

use goose::prelude::*;
use reqwest::Client;

use super::Plan;

pub fn goose_error(err: anyhow::Error) -> GooseError {
    GooseError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
}

/// Macro to transform errors from an expression to a goose transaction failure
#[macro_export]
macro_rules! goose_try {
    ($user:ident, $tag:expr, $request:expr, $func:expr) => {
        match $func {
            Ok(ret) => Ok(ret),
            Err(e) => {
                let err = e.to_string();
                if let Err(e) = $user.set_failure($tag, $request, None, Some(&err)) {
                    Err(e)
                } else {
                    panic!("Unreachable")
                }
            }
        }
    };
}

/// Replace the goose client of each user with one that honours the TLS and
/// timeout settings of the run.
pub fn setup_client(plan: Arc<Plan>) -> Transaction {
    Transaction::new(Arc::new(move |user| {
        let plan = plan.clone();
        Box::pin(async move {
            let builder = Client::builder()
                .danger_accept_invalid_certs(plan.config.insecure)
                .timeout(plan.config.request_timeout);
            user.set_client_builder(builder).await?;
            Ok(())
        })
    }))
    .set_name("setup_client")
    .set_on_start()
}
