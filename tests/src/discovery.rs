mod interfaces;
mod integration;
mod scenarios;
