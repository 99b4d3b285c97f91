//! Data RPC servicer: metadata batches for the orchestrator's validation
//! stage and reduced file content for the executor's data builder.

use std::sync::Arc;

use async_trait::async_trait;
use px_domain::{Error, Principal, Result};
use px_proto::rpc::{DataRequest, DataResponse, FileMetadata};
use uuid::Uuid;

use crate::content;
use crate::object_store::ObjectStore;
use crate::store::{FileStore, StoredFile};

pub struct DataServicer {
    files: FileStore,
    objects: Arc<dyn ObjectStore>,
    public_url: String,
}

impl DataServicer {
    pub fn new(files: FileStore, objects: Arc<dyn ObjectStore>, public_url: String) -> Self {
        Self {
            files,
            objects,
            public_url,
        }
    }

    async fn owned(&self, file_id: Uuid, principal: Principal) -> Result<StoredFile> {
        let file = self
            .files
            .find(file_id)
            .await?
            .ok_or_else(|| Error::not_found("file not found"))?;
        if file.owner_id != principal.id && !principal.is_staff {
            return Err(Error::not_found("file not found"));
        }
        Ok(file)
    }
}

#[async_trait]
impl px_rpc::Servicer for DataServicer {
    type Request = DataRequest;
    type Response = DataResponse;

    async fn handle(&self, request: DataRequest) -> Result<DataResponse> {
        match request {
            DataRequest::GetFileMetadata {
                file_ids,
                principal,
            } => {
                let found = self.files.find_many(&file_ids).await?;
                let mut out = Vec::with_capacity(file_ids.len());
                for id in &file_ids {
                    let file = found
                        .iter()
                        .find(|f| f.id == *id)
                        .ok_or_else(|| Error::not_found(format!("file {id} not found")))?;
                    if file.owner_id != principal.id && !principal.is_staff {
                        return Err(Error::permission_denied(format!(
                            "file {id} is not accessible"
                        )));
                    }
                    out.push(FileMetadata {
                        id: file.id,
                        filename: file.filename.clone(),
                        mimetype: file.mimetype.clone(),
                        size_bytes: file.size_bytes,
                    });
                }
                Ok(DataResponse::Metadata(out))
            }
            DataRequest::GetFileContent {
                file_id,
                principal,
            } => {
                let file = self.owned(file_id, principal).await?;
                let image_url = format!("{}/files/{file_id}/raw", self.public_url);

                // Images never need the bytes here; everything else does.
                if file.mimetype.starts_with("image/") {
                    return Ok(DataResponse::Content(content::reduce(
                        &file.filename,
                        &file.mimetype,
                        &[],
                        image_url,
                    )));
                }

                let bytes = self
                    .objects
                    .get(&file.storage_path)
                    .await?
                    .ok_or_else(|| {
                        Error::unavailable(format!(
                            "object for file {file_id} is not available"
                        ))
                    })?;
                Ok(DataResponse::Content(content::reduce(
                    &file.filename,
                    &file.mimetype,
                    &bytes,
                    image_url,
                )))
            }
        }
    }
}
