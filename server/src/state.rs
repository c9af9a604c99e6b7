//! Application state

use std::{any::type_name, ops::Deref, sync::Arc};

use type_map::concurrent::TypeMap;

use crate::{builder::DockerBuilder, config::AppConfig};

/// App state stored in the Axum router, assembled from what the plugins inserted
#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);

pub struct AppStateInner {
    pub config: AppConfig,
    pub builder: DockerBuilder,
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<TypeMap> for AppState {
    type Error = anyhow::Error;

    fn try_from(mut map: TypeMap) -> Result<Self, Self::Error> {
        let mut take = PluginOutputs(&mut map);
        let inner = AppStateInner {
            config: take.get()?,
            builder: take.get()?,
        };

        Ok(Self(Arc::new(inner)))
    }
}

/// Values inserted into the type map during plugin initialization
struct PluginOutputs<'a>(&'a mut TypeMap);

impl PluginOutputs<'_> {
    fn get<T: 'static>(&mut self) -> anyhow::Result<T> {
        self.0.remove().ok_or_else(|| {
            anyhow::anyhow!(
                "'{}' was never added to state, check the plugin registration order",
                type_name::<T>()
            )
        })
    }
}
