use crate::ipc::error::HandlerErr;

/// Caller identity as resolved by the external credential-verification
/// collaborator. The daemon trusts the supplied identity; it only enforces
/// presence and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Tutor,
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

pub fn require_caller(params: &serde_json::Value) -> Result<Caller, HandlerErr> {
    let caller = params
        .get("caller")
        .ok_or_else(|| HandlerErr::new("unauthorized", "missing caller identity"))?;
    let user_id = caller
        .get("userId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HandlerErr::new("unauthorized", "missing caller.userId"))?;
    let role = match caller.get("role").and_then(|v| v.as_str()) {
        Some("student") => Role::Student,
        Some("tutor") => Role::Tutor,
        _ => return Err(HandlerErr::new("unauthorized", "unknown caller.role")),
    };
    Ok(Caller {
        user_id: user_id.to_string(),
        role,
    })
}

pub fn require_student(params: &serde_json::Value) -> Result<Caller, HandlerErr> {
    let caller = require_caller(params)?;
    if caller.role != Role::Student {
        return Err(HandlerErr::new("forbidden", "student role required"));
    }
    Ok(caller)
}

pub fn require_tutor(params: &serde_json::Value) -> Result<Caller, HandlerErr> {
    let caller = require_caller(params)?;
    if caller.role != Role::Tutor {
        return Err(HandlerErr::new("forbidden", "tutor role required"));
    }
    Ok(caller)
}
