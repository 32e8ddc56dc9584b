pub mod instance_repository;
pub mod port_repository;
pub mod service_repository;

pub use instance_repository::InstanceRepository;
pub use port_repository::PortRepository;
pub use service_repository::ServiceRepository;
