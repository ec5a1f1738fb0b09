//! Region to algorithm image resolution
//!
//! The linear-learner algorithm is published as a per-region ECR image. A
//! region missing from this table is a deployment configuration problem,
//! not a retryable fault.

/// ECR registry host serving the linear-learner image in a region.
fn linear_learner_host(region: &str) -> Option<&'static str> {
    match region {
        "us-east-1" => Some("382416733822.dkr.ecr.us-east-1.amazonaws.com"),
        "us-east-2" => Some("404615174143.dkr.ecr.us-east-2.amazonaws.com"),
        "us-west-1" => Some("632365934929.dkr.ecr.us-west-1.amazonaws.com"),
        "us-west-2" => Some("174872318107.dkr.ecr.us-west-2.amazonaws.com"),
        "ca-central-1" => Some("469771592824.dkr.ecr.ca-central-1.amazonaws.com"),
        "eu-west-1" => Some("438346466558.dkr.ecr.eu-west-1.amazonaws.com"),
        "eu-west-2" => Some("644912444149.dkr.ecr.eu-west-2.amazonaws.com"),
        "eu-central-1" => Some("664544806723.dkr.ecr.eu-central-1.amazonaws.com"),
        "ap-northeast-1" => Some("351501993468.dkr.ecr.ap-northeast-1.amazonaws.com"),
        "ap-northeast-2" => Some("835164637446.dkr.ecr.ap-northeast-2.amazonaws.com"),
        "ap-southeast-1" => Some("475088953585.dkr.ecr.ap-southeast-1.amazonaws.com"),
        "ap-southeast-2" => Some("712309505854.dkr.ecr.ap-southeast-2.amazonaws.com"),
        "ap-south-1" => Some("991648021394.dkr.ecr.ap-south-1.amazonaws.com"),
        _ => None,
    }
}

/// Fully qualified linear-learner training image for a region.
pub fn training_image(region: &str) -> Option<String> {
    linear_learner_host(region).map(|host| format!("{}/linear-learner:1", host))
}
