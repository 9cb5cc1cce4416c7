
mod connection;
mod redirect;
