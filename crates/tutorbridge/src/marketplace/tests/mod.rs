mod analytics;
mod common;
mod directory;
mod messaging;
