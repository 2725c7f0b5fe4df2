//! gRPC server adapters over the service traits.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use super::error_to_status;
use super::proto::szconfig::sz_config_server::{self, SzConfigServer};
use super::proto::szconfig::*;
use super::proto::szconfigmanager::sz_config_manager_server::{self, SzConfigManagerServer};
use super::proto::szconfigmanager::*;
use super::proto::szdiagnostic;
use super::proto::szdiagnostic::sz_diagnostic_server::{self, SzDiagnosticServer};
use super::proto::szengine;
use super::proto::szengine::sz_engine_server::{self, SzEngineServer};
use super::proto::szproduct;
use super::proto::szproduct::sz_product_server::{self, SzProductServer};
use crate::config::{ConfigHandle, ConfigId};
use crate::error::{SzError, SzResult};
use crate::flags::SzFlags;
use crate::service::{
    Reinitialize, SzAbstractFactory, SzConfig, SzConfigManager, SzDiagnostic, SzEngine, SzProduct,
};

fn to_status(err: SzError) -> Status {
    error_to_status(&err)
}

/// Components served over gRPC.
#[derive(Clone)]
pub struct SzServices {
    config: Arc<dyn SzConfig>,
    config_manager: Arc<dyn SzConfigManager>,
    diagnostic: Arc<dyn SzDiagnostic>,
    engine: Arc<dyn SzEngine>,
    product: Arc<dyn SzProduct>,
}

impl std::fmt::Debug for SzServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SzServices").finish_non_exhaustive()
    }
}

impl SzServices {
    /// Creates one handle of each component from `factory`.
    ///
    /// The engine and diagnostic handles stay registered with the factory, so
    /// a reinitialize on the factory also reaches the served handles.
    pub async fn from_factory(factory: &dyn SzAbstractFactory) -> SzResult<Self> {
        Ok(Self {
            config: factory.create_config().await?,
            config_manager: factory.create_config_manager().await?,
            diagnostic: factory.create_diagnostic().await?,
            engine: factory.create_engine().await?,
            product: factory.create_product().await?,
        })
    }

    fn router(&self) -> tonic::transport::server::Router {
        Server::builder()
            .add_service(SzConfigServer::new(ConfigRpc(Arc::clone(&self.config))))
            .add_service(SzConfigManagerServer::new(ConfigManagerRpc(Arc::clone(&self.config_manager))))
            .add_service(SzDiagnosticServer::new(DiagnosticRpc(Arc::clone(&self.diagnostic))))
            .add_service(SzEngineServer::new(EngineRpc(Arc::clone(&self.engine))))
            .add_service(SzProductServer::new(ProductRpc(Arc::clone(&self.product))))
    }
}

/// Serves on `addr` until `signal` resolves.
pub async fn serve_with_shutdown<F>(services: SzServices, addr: SocketAddr, signal: F) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    tracing::info!(%addr, "serving gRPC");
    services.router().serve_with_shutdown(addr, signal).await
}

/// Serves on an already-bound listener until `signal` resolves.
pub async fn serve_incoming<F>(services: SzServices, listener: TcpListener, signal: F) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    services
        .router()
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
        .await
}

struct ConfigRpc(Arc<dyn SzConfig>);

#[tonic::async_trait]
impl sz_config_server::SzConfig for ConfigRpc {
    async fn add_data_source(
        &self,
        request: Request<AddDataSourceRequest>,
    ) -> Result<Response<AddDataSourceResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .add_data_source(ConfigHandle::new(req.config_handle), &req.data_source_code)
            .await
            .map_err(to_status)?;
        Ok(Response::new(AddDataSourceResponse { result }))
    }

    async fn close_config(&self, request: Request<CloseConfigRequest>) -> Result<Response<CloseConfigResponse>, Status> {
        let req = request.into_inner();
        self.0
            .close_config(ConfigHandle::new(req.config_handle))
            .await
            .map_err(to_status)?;
        Ok(Response::new(CloseConfigResponse {}))
    }

    async fn create_config(
        &self,
        _request: Request<CreateConfigRequest>,
    ) -> Result<Response<CreateConfigResponse>, Status> {
        let handle = self.0.create_config().await.map_err(to_status)?;
        Ok(Response::new(CreateConfigResponse { result: handle.get() }))
    }

    async fn delete_data_source(
        &self,
        request: Request<DeleteDataSourceRequest>,
    ) -> Result<Response<DeleteDataSourceResponse>, Status> {
        let req = request.into_inner();
        self.0
            .delete_data_source(ConfigHandle::new(req.config_handle), &req.data_source_code)
            .await
            .map_err(to_status)?;
        Ok(Response::new(DeleteDataSourceResponse {}))
    }

    async fn export_config(
        &self,
        request: Request<ExportConfigRequest>,
    ) -> Result<Response<ExportConfigResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .export_config(ConfigHandle::new(req.config_handle))
            .await
            .map_err(to_status)?;
        Ok(Response::new(ExportConfigResponse { result }))
    }

    async fn get_data_sources(
        &self,
        request: Request<GetDataSourcesRequest>,
    ) -> Result<Response<GetDataSourcesResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .get_data_sources(ConfigHandle::new(req.config_handle))
            .await
            .map_err(to_status)?;
        Ok(Response::new(GetDataSourcesResponse { result }))
    }

    async fn import_config(
        &self,
        request: Request<ImportConfigRequest>,
    ) -> Result<Response<ImportConfigResponse>, Status> {
        let req = request.into_inner();
        let handle = self.0.import_config(&req.config_definition).await.map_err(to_status)?;
        Ok(Response::new(ImportConfigResponse { result: handle.get() }))
    }
}

struct ConfigManagerRpc(Arc<dyn SzConfigManager>);

#[tonic::async_trait]
impl sz_config_manager_server::SzConfigManager for ConfigManagerRpc {
    async fn add_config(&self, request: Request<AddConfigRequest>) -> Result<Response<AddConfigResponse>, Status> {
        let req = request.into_inner();
        let id = self
            .0
            .add_config(&req.config_definition, &req.config_comment)
            .await
            .map_err(to_status)?;
        Ok(Response::new(AddConfigResponse { result: id.get() }))
    }

    async fn get_config(&self, request: Request<GetConfigRequest>) -> Result<Response<GetConfigResponse>, Status> {
        let req = request.into_inner();
        let result = self.0.get_config(ConfigId::new(req.config_id)).await.map_err(to_status)?;
        Ok(Response::new(GetConfigResponse { result }))
    }

    async fn get_configs(&self, _request: Request<GetConfigsRequest>) -> Result<Response<GetConfigsResponse>, Status> {
        let result = self.0.get_configs().await.map_err(to_status)?;
        Ok(Response::new(GetConfigsResponse { result }))
    }

    async fn get_default_config_id(
        &self,
        _request: Request<GetDefaultConfigIdRequest>,
    ) -> Result<Response<GetDefaultConfigIdResponse>, Status> {
        let id = self.0.get_default_config_id().await.map_err(to_status)?;
        Ok(Response::new(GetDefaultConfigIdResponse { result: id.get() }))
    }

    async fn replace_default_config_id(
        &self,
        request: Request<ReplaceDefaultConfigIdRequest>,
    ) -> Result<Response<ReplaceDefaultConfigIdResponse>, Status> {
        let req = request.into_inner();
        self.0
            .replace_default_config_id(
                ConfigId::new(req.current_default_config_id),
                ConfigId::new(req.new_default_config_id),
            )
            .await
            .map_err(to_status)?;
        Ok(Response::new(ReplaceDefaultConfigIdResponse {}))
    }

    async fn set_default_config_id(
        &self,
        request: Request<SetDefaultConfigIdRequest>,
    ) -> Result<Response<SetDefaultConfigIdResponse>, Status> {
        let req = request.into_inner();
        self.0
            .set_default_config_id(ConfigId::new(req.config_id))
            .await
            .map_err(to_status)?;
        Ok(Response::new(SetDefaultConfigIdResponse {}))
    }
}

struct DiagnosticRpc(Arc<dyn SzDiagnostic>);

#[tonic::async_trait]
impl sz_diagnostic_server::SzDiagnostic for DiagnosticRpc {
    async fn get_datastore_info(
        &self,
        _request: Request<szdiagnostic::GetDatastoreInfoRequest>,
    ) -> Result<Response<szdiagnostic::GetDatastoreInfoResponse>, Status> {
        let result = self.0.get_datastore_info().await.map_err(to_status)?;
        Ok(Response::new(szdiagnostic::GetDatastoreInfoResponse { result }))
    }

    async fn purge_repository(
        &self,
        _request: Request<szdiagnostic::PurgeRepositoryRequest>,
    ) -> Result<Response<szdiagnostic::PurgeRepositoryResponse>, Status> {
        self.0.purge_repository().await.map_err(to_status)?;
        Ok(Response::new(szdiagnostic::PurgeRepositoryResponse {}))
    }

    async fn reinitialize(
        &self,
        request: Request<szdiagnostic::ReinitializeRequest>,
    ) -> Result<Response<szdiagnostic::ReinitializeResponse>, Status> {
        let req = request.into_inner();
        self.0
            .reinitialize(ConfigId::new(req.config_id))
            .await
            .map_err(to_status)?;
        Ok(Response::new(szdiagnostic::ReinitializeResponse {}))
    }
}

struct EngineRpc(Arc<dyn SzEngine>);

#[tonic::async_trait]
impl sz_engine_server::SzEngine for EngineRpc {
    async fn add_record(
        &self,
        request: Request<szengine::AddRecordRequest>,
    ) -> Result<Response<szengine::AddRecordResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .add_record(
                &req.data_source_code,
                &req.record_id,
                &req.record_definition,
                SzFlags::from_wire(req.flags),
            )
            .await
            .map_err(to_status)?;
        Ok(Response::new(szengine::AddRecordResponse { result }))
    }

    async fn delete_record(
        &self,
        request: Request<szengine::DeleteRecordRequest>,
    ) -> Result<Response<szengine::DeleteRecordResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .delete_record(&req.data_source_code, &req.record_id, SzFlags::from_wire(req.flags))
            .await
            .map_err(to_status)?;
        Ok(Response::new(szengine::DeleteRecordResponse { result }))
    }

    async fn get_active_config_id(
        &self,
        _request: Request<szengine::GetActiveConfigIdRequest>,
    ) -> Result<Response<szengine::GetActiveConfigIdResponse>, Status> {
        let id = self.0.get_active_config_id().await.map_err(to_status)?;
        Ok(Response::new(szengine::GetActiveConfigIdResponse { result: id.get() }))
    }

    async fn get_entity_by_record_id(
        &self,
        request: Request<szengine::GetEntityByRecordIdRequest>,
    ) -> Result<Response<szengine::GetEntityByRecordIdResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .get_entity_by_record_id(&req.data_source_code, &req.record_id, SzFlags::from_wire(req.flags))
            .await
            .map_err(to_status)?;
        Ok(Response::new(szengine::GetEntityByRecordIdResponse { result }))
    }

    async fn get_record(
        &self,
        request: Request<szengine::GetRecordRequest>,
    ) -> Result<Response<szengine::GetRecordResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .get_record(&req.data_source_code, &req.record_id, SzFlags::from_wire(req.flags))
            .await
            .map_err(to_status)?;
        Ok(Response::new(szengine::GetRecordResponse { result }))
    }

    async fn reinitialize(
        &self,
        request: Request<szengine::ReinitializeRequest>,
    ) -> Result<Response<szengine::ReinitializeResponse>, Status> {
        let req = request.into_inner();
        self.0
            .reinitialize(ConfigId::new(req.config_id))
            .await
            .map_err(to_status)?;
        Ok(Response::new(szengine::ReinitializeResponse {}))
    }

    async fn search_by_attributes(
        &self,
        request: Request<szengine::SearchByAttributesRequest>,
    ) -> Result<Response<szengine::SearchByAttributesResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .0
            .search_by_attributes(&req.attributes, &req.search_profile, SzFlags::from_wire(req.flags))
            .await
            .map_err(to_status)?;
        Ok(Response::new(szengine::SearchByAttributesResponse { result }))
    }
}

struct ProductRpc(Arc<dyn SzProduct>);

#[tonic::async_trait]
impl sz_product_server::SzProduct for ProductRpc {
    async fn get_license(
        &self,
        _request: Request<szproduct::GetLicenseRequest>,
    ) -> Result<Response<szproduct::GetLicenseResponse>, Status> {
        let result = self.0.get_license().await.map_err(to_status)?;
        Ok(Response::new(szproduct::GetLicenseResponse { result }))
    }

    async fn get_version(
        &self,
        _request: Request<szproduct::GetVersionRequest>,
    ) -> Result<Response<szproduct::GetVersionResponse>, Status> {
        let result = self.0.get_version().await.map_err(to_status)?;
        Ok(Response::new(szproduct::GetVersionResponse { result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tonic::Code;

    use crate::service::InMemorySenzing;

    #[tokio::test]
    async fn test_duplicate_data_source_maps_to_already_exists() {
        let service = InMemorySenzing::new();
        let services = SzServices::from_factory(&service).await.unwrap();
        let rpc = ConfigRpc(Arc::clone(&services.config));

        let handle = sz_config_server::SzConfig::create_config(&rpc, Request::new(CreateConfigRequest {}))
            .await
            .unwrap()
            .into_inner()
            .result;
        let status = sz_config_server::SzConfig::add_data_source(
            &rpc,
            Request::new(AddDataSourceRequest {
                config_handle: handle,
                data_source_code: "TEST".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(status.code(), Code::AlreadyExists);
        assert!(status.message().starts_with("SENZ7217|"));
    }

    #[tokio::test]
    async fn test_version_is_forwarded() {
        let service = InMemorySenzing::new();
        let services = SzServices::from_factory(&service).await.unwrap();
        let rpc = ProductRpc(Arc::clone(&services.product));

        let version = sz_product_server::SzProduct::get_version(&rpc, Request::new(szproduct::GetVersionRequest {}))
            .await
            .unwrap()
            .into_inner()
            .result;
        let v: serde_json::Value = serde_json::from_str(&version).unwrap();
        assert_eq!(v["VERSION"], env!("CARGO_PKG_VERSION"));
    }
}
