use keyop_client::crd::KeycloakClient;

use kube::CustomResourceExt;

fn main() {
    match serde_yaml::to_string(&KeycloakClient::crd()) {
        Ok(yaml) => print!("---\n{yaml}\n"),
        Err(e) => {
            eprintln!("failed to serialize CRD: {e}");
            std::process::exit(1);
        }
    }
}
