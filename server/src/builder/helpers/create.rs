use bollard::{
    models::ContainerCreateBody,
    query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder},
};

use crate::builder::constants::{APP_LABEL, LAUNCH_LABEL};

/// Setup container creation for launching the built image. Unless `command` is given,
/// no command is set, so the image's own entry command runs.
pub fn setup_container(
    launch_id: &str,
    image: &str,
    command: Option<Vec<String>>,
    env: Option<Vec<String>>,
) -> (ContainerCreateBody, CreateContainerOptions) {
    let container_body = ContainerCreateBody {
        image: Some(image.to_owned()),
        cmd: command,
        env,
        labels: Some(
            [
                (APP_LABEL.into(), format!("v{}", env!("CARGO_PKG_VERSION"))),
                (LAUNCH_LABEL.into(), launch_id.into()),
            ]
            .into(),
        ),
        ..Default::default()
    };
    let container_options = CreateContainerOptionsBuilder::new().name(launch_id).build();

    (container_body, container_options)
}
