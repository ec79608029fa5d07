//! Query and mutation texts.

pub const CURRENT_ROUND: &str = r"
query($tournament: Int!) {
  rounds(tournament: $tournament number: 0) {
    number
  }
}";

pub const ROUND_WINDOW: &str = r"
query($tournament: Int!) {
  rounds(tournament: $tournament number: 0) {
    number
    openTime
    closeStakingTime
  }
}";

pub const ACCOUNT: &str = r"
query {
  account {
    id
    username
    email
    status
    mfaEnabled
    walletAddress
    availableNmr
    insertedAt
    models {
      id
      name
      tournament
    }
  }
}";

pub const ACCOUNT_MODELS: &str = r"
query {
  account {
    models {
      id
      name
      tournament
    }
  }
}";

pub const LIST_DATASETS: &str = r"
query($round: Int) {
  listDatasets(round: $round)
}";

pub const DATASET: &str = r"
query($filename: String! $round: Int) {
  dataset(filename: $filename round: $round)
}";

pub const SUBMISSION_UPLOAD_AUTH: &str = r"
query($filename: String! $tournament: Int! $modelId: String) {
  submissionUploadAuth(filename: $filename tournament: $tournament modelId: $modelId) {
    filename
    url
  }
}";

pub const CREATE_SUBMISSION: &str = r#"
mutation($filename: String! $tournament: Int! $modelId: String $triggerId: String) {
  createSubmission(filename: $filename tournament: $tournament modelId: $modelId triggerId: $triggerId source: "numerapi") {
    id
  }
}"#;

pub const SIGNALS_UPLOAD_AUTH: &str = r"
query($filename: String! $modelId: String) {
  submissionUploadSignalsAuth(filename: $filename modelId: $modelId) {
    filename
    url
  }
}";

pub const CREATE_SIGNALS_SUBMISSION: &str = r#"
mutation($filename: String! $modelId: String $triggerId: String) {
  createSignalsSubmission(filename: $filename modelId: $modelId triggerId: $triggerId source: "numerapi") {
    id
  }
}"#;

pub const DIAGNOSTICS_UPLOAD_AUTH: &str = r"
query($filename: String! $tournament: Int! $modelId: String) {
  diagnosticsUploadAuth(filename: $filename tournament: $tournament modelId: $modelId) {
    filename
    url
  }
}";

pub const CREATE_DIAGNOSTICS: &str = r"
mutation($filename: String! $tournament: Int! $modelId: String) {
  createDiagnostics(filename: $filename tournament: $tournament modelId: $modelId) {
    id
  }
}";
