//! Auth-domain identifiers, endpoint scope definitions, and token models.

pub mod id;
pub mod scope;
pub mod token {
	//! Token records and the redacting secret wrapper.

	pub mod record;
	pub mod secret;
}

pub use id::*;
pub use scope::*;
pub use token::{record::*, secret::*};
