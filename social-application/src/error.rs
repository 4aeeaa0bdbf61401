use social_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    /// 请求参数不合法（对外表现为 400）
    #[error("{0}")]
    BadRequest(String),

    /// 需要登录或无权执行
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("infra: {0}")]
    Infra(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: command={command}")]
    AlreadyRegisteredCommand { command: &'static str },

    #[error("handler already registered: query={query}")]
    AlreadyRegisteredQuery { query: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl AppError {
    /// 领域层的 BadRequest/Unauthorized 与应用层同名错误视为同一类
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_) | AppError::Domain(DomainError::BadRequest { .. })
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized(_) | AppError::Domain(DomainError::Unauthorized { .. })
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
