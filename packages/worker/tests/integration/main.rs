mod ingestion;
mod poller;
mod verification;
