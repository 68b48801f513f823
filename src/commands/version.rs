use crate::error::Result;
use crate::version::{PKG_NAME, VERSION};

pub fn execute() -> Result<()> {
    println!("{} {}", PKG_NAME, VERSION);
    Ok(())
}
