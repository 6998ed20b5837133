use fuzzpack_lib::platform::{TargetTriple, paths, platform_string};

use crate::output::field;

pub fn cmd_info() {
  println!("System:");
  match platform_string() {
    Some(platform) => field("Platform", platform),
    None => println!("Could not detect platform."),
  }
  if let Some(triple) = TargetTriple::host() {
    field("Host triple", triple);
  }
  println!();
  println!("Paths:");
  field("Work", paths::work_dir().display());
  field("Downloads", paths::downloads_dir().display());
}
