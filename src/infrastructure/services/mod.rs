//! Infrastructure services

mod definition_service;

pub use definition_service::{
    AddStepRequest, CreateWorkflowRequest, DefinitionService, SetTriggerRequest,
};
