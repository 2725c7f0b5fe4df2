//! gRPC client implementations of the service traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use super::proto::szconfig::sz_config_client::SzConfigClient;
use super::proto::szconfig::{
    AddDataSourceRequest, CloseConfigRequest, CreateConfigRequest, DeleteDataSourceRequest,
    ExportConfigRequest, GetDataSourcesRequest, ImportConfigRequest,
};
use super::proto::szconfigmanager::sz_config_manager_client::SzConfigManagerClient;
use super::proto::szconfigmanager::{
    AddConfigRequest, GetConfigRequest, GetConfigsRequest, GetDefaultConfigIdRequest,
    ReplaceDefaultConfigIdRequest, SetDefaultConfigIdRequest,
};
use super::proto::szdiagnostic;
use super::proto::szdiagnostic::sz_diagnostic_client::SzDiagnosticClient;
use super::proto::szengine;
use super::proto::szengine::sz_engine_client::SzEngineClient;
use super::proto::szproduct::sz_product_client::SzProductClient;
use super::proto::szproduct::{GetLicenseRequest, GetVersionRequest};
use super::status_to_error;
use crate::config::{ConfigHandle, ConfigId};
use crate::error::{SzResult, TransportError};
use crate::flags::SzFlags;
use crate::registry::HandleRegistry;
use crate::service::{
    Reinitialize, SzAbstractFactory, SzConfig, SzConfigManager, SzDiagnostic, SzEngine, SzProduct,
};

fn with_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Factory for gRPC-backed component handles sharing one channel.
#[derive(Debug, Clone)]
pub struct GrpcAbstractFactory {
    channel: Channel,
    registry: Arc<HandleRegistry>,
}

impl GrpcAbstractFactory {
    /// Connects to `url` (`host:port`, optionally with a scheme).
    pub async fn connect(url: &str, connect_timeout: Duration) -> SzResult<Self> {
        let target = with_scheme(url);
        let endpoint = Endpoint::from_shared(target.clone())
            .map_err(|e| TransportError::ConnectionFailed {
                message: format!("invalid address {target}: {e}"),
            })?
            .connect_timeout(connect_timeout);
        let channel = endpoint.connect().await.map_err(|e| TransportError::ConnectionFailed {
            message: format!("{target}: {e}"),
        })?;
        tracing::info!(url = %target, "connected to gRPC service");
        Ok(Self::from_channel(channel))
    }

    /// Wraps an existing channel.
    #[must_use]
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            channel,
            registry: Arc::new(HandleRegistry::new()),
        }
    }

    /// Registry of engine and diagnostic handles created by this factory.
    #[must_use]
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    fn engine(&self) -> GrpcEngine {
        GrpcEngine {
            client: SzEngineClient::new(self.channel.clone()),
        }
    }

    fn diagnostic(&self) -> GrpcDiagnostic {
        GrpcDiagnostic {
            client: SzDiagnosticClient::new(self.channel.clone()),
        }
    }
}

#[async_trait]
impl SzAbstractFactory for GrpcAbstractFactory {
    async fn create_config(&self) -> SzResult<Arc<dyn SzConfig>> {
        Ok(Arc::new(GrpcConfig {
            client: SzConfigClient::new(self.channel.clone()),
        }))
    }

    async fn create_config_manager(&self) -> SzResult<Arc<dyn SzConfigManager>> {
        Ok(Arc::new(GrpcConfigManager {
            client: SzConfigManagerClient::new(self.channel.clone()),
        }))
    }

    async fn create_diagnostic(&self) -> SzResult<Arc<dyn SzDiagnostic>> {
        let diagnostic = Arc::new(self.diagnostic());
        self.registry.register("diagnostic", &diagnostic)?;
        Ok(diagnostic)
    }

    async fn create_engine(&self) -> SzResult<Arc<dyn SzEngine>> {
        let engine = Arc::new(self.engine());
        self.registry.register("engine", &engine)?;
        Ok(engine)
    }

    async fn create_product(&self) -> SzResult<Arc<dyn SzProduct>> {
        Ok(Arc::new(GrpcProduct {
            client: SzProductClient::new(self.channel.clone()),
        }))
    }

    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
        if self.registry.notify(config_id).await? > 0 {
            return Ok(());
        }
        // The service still caches the old configuration when no handle is alive.
        tracing::debug!(config_id = %config_id, "no live handles; reinitializing through a transient engine");
        self.engine().reinitialize(config_id).await
    }
}

/// gRPC [`SzConfig`].
#[derive(Debug, Clone)]
pub struct GrpcConfig {
    client: SzConfigClient<Channel>,
}

#[async_trait]
impl SzConfig for GrpcConfig {
    async fn create_config(&self) -> SzResult<ConfigHandle> {
        let resp = self
            .client
            .clone()
            .create_config(CreateConfigRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(ConfigHandle::new(resp.into_inner().result))
    }

    async fn import_config(&self, config_definition: &str) -> SzResult<ConfigHandle> {
        let resp = self
            .client
            .clone()
            .import_config(ImportConfigRequest {
                config_definition: config_definition.to_string(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(ConfigHandle::new(resp.into_inner().result))
    }

    async fn add_data_source(&self, handle: ConfigHandle, data_source_code: &str) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .add_data_source(AddDataSourceRequest {
                config_handle: handle.get(),
                data_source_code: data_source_code.to_string(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn delete_data_source(&self, handle: ConfigHandle, data_source_code: &str) -> SzResult<()> {
        self.client
            .clone()
            .delete_data_source(DeleteDataSourceRequest {
                config_handle: handle.get(),
                data_source_code: data_source_code.to_string(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }

    async fn get_data_sources(&self, handle: ConfigHandle) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_data_sources(GetDataSourcesRequest {
                config_handle: handle.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn export_config(&self, handle: ConfigHandle) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .export_config(ExportConfigRequest {
                config_handle: handle.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn close_config(&self, handle: ConfigHandle) -> SzResult<()> {
        self.client
            .clone()
            .close_config(CloseConfigRequest {
                config_handle: handle.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }
}

/// gRPC [`SzConfigManager`].
#[derive(Debug, Clone)]
pub struct GrpcConfigManager {
    client: SzConfigManagerClient<Channel>,
}

#[async_trait]
impl SzConfigManager for GrpcConfigManager {
    async fn add_config(&self, config_definition: &str, config_comment: &str) -> SzResult<ConfigId> {
        let resp = self
            .client
            .clone()
            .add_config(AddConfigRequest {
                config_definition: config_definition.to_string(),
                config_comment: config_comment.to_string(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(ConfigId::new(resp.into_inner().result))
    }

    async fn get_config(&self, config_id: ConfigId) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_config(GetConfigRequest {
                config_id: config_id.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn get_configs(&self) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_configs(GetConfigsRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn get_default_config_id(&self) -> SzResult<ConfigId> {
        let resp = self
            .client
            .clone()
            .get_default_config_id(GetDefaultConfigIdRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(ConfigId::new(resp.into_inner().result))
    }

    async fn replace_default_config_id(&self, current: ConfigId, new: ConfigId) -> SzResult<()> {
        self.client
            .clone()
            .replace_default_config_id(ReplaceDefaultConfigIdRequest {
                current_default_config_id: current.get(),
                new_default_config_id: new.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }

    async fn set_default_config_id(&self, config_id: ConfigId) -> SzResult<()> {
        self.client
            .clone()
            .set_default_config_id(SetDefaultConfigIdRequest {
                config_id: config_id.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }
}

/// gRPC [`SzDiagnostic`].
#[derive(Debug, Clone)]
pub struct GrpcDiagnostic {
    client: SzDiagnosticClient<Channel>,
}

#[async_trait]
impl Reinitialize for GrpcDiagnostic {
    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
        self.client
            .clone()
            .reinitialize(szdiagnostic::ReinitializeRequest {
                config_id: config_id.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }
}

#[async_trait]
impl SzDiagnostic for GrpcDiagnostic {
    async fn get_datastore_info(&self) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_datastore_info(szdiagnostic::GetDatastoreInfoRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn purge_repository(&self) -> SzResult<()> {
        self.client
            .clone()
            .purge_repository(szdiagnostic::PurgeRepositoryRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }
}

/// gRPC [`SzEngine`].
#[derive(Debug, Clone)]
pub struct GrpcEngine {
    client: SzEngineClient<Channel>,
}

#[async_trait]
impl Reinitialize for GrpcEngine {
    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
        self.client
            .clone()
            .reinitialize(szengine::ReinitializeRequest {
                config_id: config_id.get(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(())
    }
}

#[async_trait]
impl SzEngine for GrpcEngine {
    async fn get_active_config_id(&self) -> SzResult<ConfigId> {
        let resp = self
            .client
            .clone()
            .get_active_config_id(szengine::GetActiveConfigIdRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(ConfigId::new(resp.into_inner().result))
    }

    async fn add_record(
        &self,
        data_source_code: &str,
        record_id: &str,
        record_definition: &str,
        flags: SzFlags,
    ) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .add_record(szengine::AddRecordRequest {
                data_source_code: data_source_code.to_string(),
                record_id: record_id.to_string(),
                record_definition: record_definition.to_string(),
                flags: flags.to_wire(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn delete_record(&self, data_source_code: &str, record_id: &str, flags: SzFlags) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .delete_record(szengine::DeleteRecordRequest {
                data_source_code: data_source_code.to_string(),
                record_id: record_id.to_string(),
                flags: flags.to_wire(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn get_record(&self, data_source_code: &str, record_id: &str, flags: SzFlags) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_record(szengine::GetRecordRequest {
                data_source_code: data_source_code.to_string(),
                record_id: record_id.to_string(),
                flags: flags.to_wire(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn get_entity_by_record_id(
        &self,
        data_source_code: &str,
        record_id: &str,
        flags: SzFlags,
    ) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_entity_by_record_id(szengine::GetEntityByRecordIdRequest {
                data_source_code: data_source_code.to_string(),
                record_id: record_id.to_string(),
                flags: flags.to_wire(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn search_by_attributes(
        &self,
        attributes: &str,
        search_profile: &str,
        flags: SzFlags,
    ) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .search_by_attributes(szengine::SearchByAttributesRequest {
                attributes: attributes.to_string(),
                search_profile: search_profile.to_string(),
                flags: flags.to_wire(),
            })
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }
}

/// gRPC [`SzProduct`].
#[derive(Debug, Clone)]
pub struct GrpcProduct {
    client: SzProductClient<Channel>,
}

#[async_trait]
impl SzProduct for GrpcProduct {
    async fn get_version(&self) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_version(GetVersionRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }

    async fn get_license(&self) -> SzResult<String> {
        let resp = self
            .client
            .clone()
            .get_license(GetLicenseRequest {})
            .await
            .map_err(|s| status_to_error(&s))?;
        Ok(resp.into_inner().result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("localhost:8261"), "http://localhost:8261");
        assert_eq!(with_scheme("https://sz.example:443"), "https://sz.example:443");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = GrpcAbstractFactory::connect(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.is_retryable());
    }
}
