//! Data builder: fetch the content of every `file_id` input.

use futures_util::future::try_join_all;
use px_domain::{Error, Principal, Result};
use px_domain::config::Settings;
use px_proto::job::InputItem;
use px_proto::rpc::{DataRequest, DataResponse, FileContent};

use super::BuildContext;

pub async fn build(ctx: &mut BuildContext, settings: &Settings) -> Result<()> {
    let principal = Principal::user(ctx.job.user_id());
    let file_ids: Vec<_> = ctx
        .job
        .inputs()
        .iter()
        .filter_map(|i| match i {
            InputItem::FileId { id } => Some(*id),
            _ => None,
        })
        .collect();

    if file_ids.is_empty() {
        return Ok(());
    }

    tracing::info!(job_id = %ctx.job.id(), count = file_ids.len(), "fetching on-the-fly inputs");

    let fetches = file_ids.into_iter().map(|file_id| {
        let addr = settings.data_rpc_addr.clone();
        async move {
            let response: DataResponse = px_rpc::call(
                &addr,
                &DataRequest::GetFileContent { file_id, principal },
            )
            .await?;
            match response {
                DataResponse::Content(content) => Ok::<FileContent, Error>(content),
                _ => Err(Error::internal("unexpected data rpc response")),
            }
        }
    });

    ctx.fetched = try_join_all(fetches).await?;
    Ok(())
}
