mod maintenance;
