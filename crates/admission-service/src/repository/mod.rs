//! 仓储层模块

mod event_repo;
mod registration_repo;
mod traits;

pub use event_repo::EventRepository;
pub use registration_repo::RegistrationRepository;
pub use traits::{EventRepositoryTrait, RegistrationRepositoryTrait};

#[cfg(test)]
pub use traits::{MockEventRepositoryTrait, MockRegistrationRepositoryTrait};
