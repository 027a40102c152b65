//! Resources exposed to the device-management server
//!
//! A resource is a named scalar the server can read, write or execute,
//! depending on the methods the resource allows. The [`ResourceTable`] owns
//! every resource and enforces the method and observability contract; the
//! rest of the agent refers to resources through [`ResourceHandle`]s.

mod table;

pub use table::*;

use core::fmt;
use core::ops::BitOr;

use thiserror_no_std::Error;

/// Maximum length of a resource path such as `3303/2/5700`
pub const MAX_PATH_LEN: usize = 24;

/// Maximum length of a display name
pub const MAX_NAME_LEN: usize = 32;

/// Maximum length of a text value
pub const MAX_TEXT_LEN: usize = 32;

/// Maximum POST body carried through the event queue
pub const MAX_POST_PAYLOAD: usize = 64;

pub type ResourcePath = heapless::String<MAX_PATH_LEN>;
pub type ResourceName = heapless::String<MAX_NAME_LEN>;
pub type PostPayload = heapless::Vec<u8, MAX_POST_PAYLOAD>;

/// Method a server may invoke on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

impl Method {
    const fn bit(self) -> u8 {
        match self {
            Method::Get => 0b001,
            Method::Put => 0b010,
            Method::Post => 0b100,
        }
    }
}

/// Set of allowed methods
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Methods(u8);

impl Methods {
    pub const NONE: Methods = Methods(0);
    pub const GET: Methods = Methods(Method::Get.bit());
    pub const PUT: Methods = Methods(Method::Put.bit());
    pub const POST: Methods = Methods(Method::Post.bit());

    pub const fn contains(self, method: Method) -> bool {
        self.0 & method.bit() != 0
    }
}

impl BitOr for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Methods) -> Methods {
        Methods(self.0 | rhs.0)
    }
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        for method in [Method::Get, Method::Put, Method::Post] {
            if self.contains(method) {
                list.entry(&method);
            }
        }
        list.finish()
    }
}

/// Who is writing a resource value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The device itself, e.g. counting button presses into a GET-only resource
    Local,
    /// The management server invoking a method
    Remote(Method),
}

/// Current value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Int(i64),
    Float(f32),
    Text(heapless::String<MAX_TEXT_LEN>),
}

impl Default for ResourceValue {
    fn default() -> Self {
        ResourceValue::Int(0)
    }
}

impl ResourceValue {
    /// Integer view of the value; text is parsed, floats are truncated
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ResourceValue::Int(v) => Some(*v),
            ResourceValue::Float(v) => Some(*v as i64),
            ResourceValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Float view of the value; text is parsed
    pub fn as_float(&self) -> Option<f32> {
        match self {
            ResourceValue::Int(v) => Some(*v as f32),
            ResourceValue::Float(v) => Some(*v),
            ResourceValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Build a text value, failing if it does not fit
    pub fn text(value: &str) -> Result<Self, ResourceError> {
        heapless::String::try_from(value)
            .map(ResourceValue::Text)
            .map_err(|_| ResourceError::ValueTooLong)
    }
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::Int(v) => write!(f, "{}", v),
            ResourceValue::Float(v) => write!(f, "{:.4}", v),
            ResourceValue::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome of a push-notification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    NotDelivered,
    Unknown,
}

impl DeliveryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Delivered => "Delivered",
            Self::NotDelivered => "Not delivered",
            Self::Unknown => "Unknown",
        }
    }
}

/// Local contract violations reported synchronously by the table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("resource path {0} already exists")]
    DuplicatePath(ResourcePath),
    #[error("{method:?} not allowed on {path} (allowed: {allowed:?})")]
    MethodNotAllowed {
        path: ResourcePath,
        method: Method,
        allowed: Methods,
    },
    #[error("no resource at path {0}")]
    UnknownPath(ResourcePath),
    #[error("resource table is full")]
    TableFull,
    #[error("invalid resource path or name")]
    InvalidPath,
    #[error("value does not fit in a resource")]
    ValueTooLong,
}
