mod error;
pub use error::InfraError;

mod provisioner;
pub use provisioner::Provisioner;

mod state;
pub use state::{NonSensitiveAttributes, STATE_FILE, TfInstance, TfResource, TfState};

mod template;
pub use template::{MAIN_FILE, render_cloud_runner, render_local_destroy};

mod terraform;
pub use terraform::{MIN_VERSION, Terraform};
